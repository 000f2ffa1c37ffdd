//! Tests for owned collections: insert-check, mutation and structural events.

use rstest::{fixture, rstest};

use modeldom::domain::{
    Change, DomainError, InsertCheckFlags, InsertCheckResult, NewNode, NodeArena, NodeId,
    NodeKind, StructuralReason,
};
use modeldom::util::testing::{init_test_setup, operations, record_changes};

const NO_FLAGS: InsertCheckFlags = InsertCheckFlags::empty();

struct Doc {
    arena: NodeArena,
    document: NodeId,
    page: NodeId,
    step: NodeId,
}

#[fixture]
fn doc() -> Doc {
    init_test_setup();
    let mut arena = NodeArena::new();
    let document = arena.create(NodeKind::Document);
    let page = arena.create(NewNode::new(NodeKind::Page).named("Main"));
    let step = arena.create(NodeKind::Step);
    arena.push(document, page).unwrap();
    arena.push(page, step).unwrap();
    Doc {
        arena,
        document,
        page,
        step,
    }
}

fn element(arena: &mut NodeArena, name: &str) -> NodeId {
    arena.create(NewNode::new(NodeKind::Element).named(name))
}

#[rstest]
fn given_empty_collection_when_inserting_at_zero_then_single_items_added(mut doc: Doc) {
    // Arrange
    let a = element(&mut doc.arena, "a");
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    // Act
    doc.arena.insert(doc.step, 0, a).unwrap();

    // Assert
    assert_eq!(doc.arena.items(doc.step).unwrap(), &[a]);
    let added: Vec<_> = log
        .borrow()
        .iter()
        .filter(|e| e.operation() == "ItemsAdded")
        .map(|e| e.payload().clone())
        .collect();
    assert_eq!(added, vec![Change::ItemsAdded { index: 0, items: vec![a] }]);
}

#[rstest]
fn given_successful_insert_then_parent_set_and_one_added_one_parent_changed(mut doc: Doc) {
    // Arrange
    let a = element(&mut doc.arena, "a");
    let collection_log = record_changes(&mut doc.arena, doc.step).unwrap();
    let item_log = record_changes(&mut doc.arena, a).unwrap();

    // Act
    assert_eq!(
        doc.arena.can_insert(doc.step, a, NO_FLAGS),
        InsertCheckResult::CanInsert
    );
    doc.arena.push(doc.step, a).unwrap();

    // Assert
    assert_eq!(doc.arena.parent(a).unwrap(), Some(doc.step));
    assert_eq!(operations(&collection_log), vec!["ItemsAdded", "ParentChanged"]);
    assert_eq!(operations(&item_log), vec!["ParentChanged"]);
}

#[rstest]
#[case::page_into_step(NodeKind::Page, InsertCheckResult::NotSupported)]
#[case::document_into_step(NodeKind::Document, InsertCheckResult::NotSupported)]
#[case::element_into_step(NodeKind::Element, InsertCheckResult::CanInsert)]
#[case::group_into_step(NodeKind::Group, InsertCheckResult::CanInsert)]
#[case::reference_into_step(NodeKind::Reference, InsertCheckResult::CanInsert)]
fn given_candidate_kind_when_inserting_then_insert_agrees_with_can_insert(
    mut doc: Doc,
    #[case] kind: NodeKind,
    #[case] expected: InsertCheckResult,
) {
    let candidate = doc.arena.create(kind);

    let check = doc.arena.can_insert(doc.step, candidate, NO_FLAGS);
    let result = doc.arena.push(doc.step, candidate);

    assert_eq!(check, expected);
    assert_eq!(result.is_ok(), check.is_ok());
}

#[rstest]
fn given_element_when_inserting_directly_into_page_then_top_level_not_allowed(mut doc: Doc) {
    let a = element(&mut doc.arena, "a");

    assert_eq!(
        doc.arena.can_insert(doc.page, a, NO_FLAGS),
        InsertCheckResult::TopLevelNotAllowed
    );
    let err = doc.arena.push(doc.page, a).unwrap_err();
    assert_eq!(err.reason(), Some(StructuralReason::TopLevelNotAllowed));
}

#[rstest]
fn given_ancestor_page_when_inserting_into_its_own_step_then_circular_reference(mut doc: Doc) {
    // Arrange: page is detached from the document so only the cycle applies
    doc.arena.remove(doc.document, doc.page).unwrap();
    let group = doc.arena.create(NewNode::new(NodeKind::Group).named("g"));
    doc.arena.push(doc.step, group).unwrap();

    // Act
    let check = doc.arena.can_insert(group, doc.page, NO_FLAGS);
    let result = doc.arena.push(group, doc.page);

    // Assert
    assert_eq!(check, InsertCheckResult::CircularReference);
    assert_eq!(
        result.unwrap_err().reason(),
        Some(StructuralReason::CircularReference)
    );
    assert!(doc.arena.is_empty(group).unwrap());
}

#[rstest]
fn given_reference_to_page_when_inserting_inside_that_page_then_circular_reference(
    mut doc: Doc,
) {
    let reference = doc.arena.create(NewNode::new(NodeKind::Reference).target(doc.page));

    assert_eq!(
        doc.arena.can_insert(doc.step, reference, NO_FLAGS),
        InsertCheckResult::CircularReference
    );
}

#[rstest]
fn given_reference_in_page_when_retargeting_to_own_page_then_circular_reference(
    mut doc: Doc,
) {
    // Arrange
    let other = doc.arena.create(NewNode::new(NodeKind::Page).named("Other"));
    doc.arena.push(doc.document, other).unwrap();
    let reference = doc.arena.create(NewNode::new(NodeKind::Reference).target(other));
    doc.arena.push(doc.step, reference).unwrap();

    // Act
    let result = doc.arena.set_target(reference, Some(doc.page));

    // Assert
    assert_eq!(
        result.unwrap_err().reason(),
        Some(StructuralReason::CircularReference)
    );
    assert_eq!(doc.arena.target(reference).unwrap(), Some(other));
}

#[rstest]
fn given_locked_collection_when_inserting_then_locked_unless_ignore_lock(mut doc: Doc) {
    // Arrange
    doc.arena.set_locked(doc.step, true).unwrap();
    let a = element(&mut doc.arena, "a");

    // Act & Assert: without override
    assert_eq!(
        doc.arena.can_insert(doc.step, a, NO_FLAGS),
        InsertCheckResult::Locked
    );
    assert_eq!(doc.arena.push(doc.step, a), Err(DomainError::Locked(doc.step)));

    // Act & Assert: with override
    doc.arena
        .insert_with(doc.step, 0, a, InsertCheckFlags::IGNORE_LOCK)
        .unwrap();
    assert_eq!(doc.arena.items(doc.step).unwrap(), &[a]);
    assert!(doc.arena.is_locked(doc.step).unwrap());
}

#[rstest]
fn given_existing_member_when_inserting_again_then_already_member(mut doc: Doc) {
    let a = element(&mut doc.arena, "a");
    doc.arena.push(doc.step, a).unwrap();

    assert_eq!(
        doc.arena.can_insert(doc.step, a, NO_FLAGS),
        InsertCheckResult::AlreadyMember
    );
}

#[rstest]
fn given_member_of_other_collection_when_inserting_then_has_different_container(mut doc: Doc) {
    // Arrange
    let second = doc.arena.create(NodeKind::Step);
    doc.arena.push(doc.page, second).unwrap();
    let a = element(&mut doc.arena, "a");
    doc.arena.push(doc.step, a).unwrap();

    // Act & Assert
    assert_eq!(
        doc.arena.can_insert(second, a, NO_FLAGS),
        InsertCheckResult::HasDifferentContainer
    );
    assert_eq!(
        doc.arena.can_insert(second, a, InsertCheckFlags::IGNORE_CONTAINER),
        InsertCheckResult::CanInsert
    );
}

#[rstest]
fn given_ignore_container_when_inserting_then_node_moves(mut doc: Doc) {
    // Arrange
    let second = doc.arena.create(NodeKind::Step);
    doc.arena.push(doc.page, second).unwrap();
    let a = element(&mut doc.arena, "a");
    doc.arena.push(doc.step, a).unwrap();
    let source_log = record_changes(&mut doc.arena, doc.step).unwrap();
    let item_log = record_changes(&mut doc.arena, a).unwrap();

    // Act
    doc.arena
        .insert_with(second, 0, a, InsertCheckFlags::IGNORE_CONTAINER)
        .unwrap();

    // Assert
    assert!(doc.arena.is_empty(doc.step).unwrap());
    assert_eq!(doc.arena.items(second).unwrap(), &[a]);
    assert_eq!(operations(&source_log), vec!["ItemsRemoved"]);
    assert_eq!(
        item_log.borrow().last().map(|e| e.payload().clone()),
        Some(Change::ParentChanged {
            old: Some(doc.step),
            new: Some(second)
        })
    );
}

#[rstest]
fn given_locked_source_when_moving_then_locked_and_nothing_moves(mut doc: Doc) {
    // Arrange
    let second = doc.arena.create(NodeKind::Step);
    doc.arena.push(doc.page, second).unwrap();
    let a = element(&mut doc.arena, "a");
    doc.arena.push(doc.step, a).unwrap();
    doc.arena.set_locked(doc.step, true).unwrap();
    let log = record_changes(&mut doc.arena, second).unwrap();

    // Act
    let result = doc
        .arena
        .insert_with(second, 0, a, InsertCheckFlags::IGNORE_CONTAINER);

    // Assert
    assert!(matches!(result, Err(DomainError::Locked(_))));
    assert_eq!(doc.arena.items(doc.step).unwrap(), &[a]);
    assert!(doc.arena.is_empty(second).unwrap());
    assert!(log.borrow().is_empty());

    doc.arena
        .insert_with(
            second,
            0,
            a,
            InsertCheckFlags::IGNORE_CONTAINER | InsertCheckFlags::IGNORE_LOCK,
        )
        .unwrap();
    assert_eq!(doc.arena.items(second).unwrap(), &[a]);
}

#[rstest]
#[case::same_case("Main", InsertCheckResult::DuplicateName)]
#[case::other_case("MAIN", InsertCheckResult::DuplicateName)]
#[case::different("Tower", InsertCheckResult::CanInsert)]
fn given_page_names_when_inserting_then_compared_case_insensitively(
    mut doc: Doc,
    #[case] name: &str,
    #[case] expected: InsertCheckResult,
) {
    let page = doc.arena.create(NewNode::new(NodeKind::Page).named(name));

    assert_eq!(doc.arena.can_insert(doc.document, page, NO_FLAGS), expected);
}

#[rstest]
#[case::same_case("roof", InsertCheckResult::DuplicateName)]
#[case::other_case("Roof", InsertCheckResult::CanInsert)]
fn given_group_names_when_inserting_then_compared_case_sensitively(
    mut doc: Doc,
    #[case] name: &str,
    #[case] expected: InsertCheckResult,
) {
    let existing = doc.arena.create(NewNode::new(NodeKind::Group).named("roof"));
    doc.arena.push(doc.step, existing).unwrap();
    let group = doc.arena.create(NewNode::new(NodeKind::Group).named(name));

    assert_eq!(doc.arena.can_insert(doc.step, group, NO_FLAGS), expected);
}

#[rstest]
fn given_duplicate_named_page_when_replacing_namesake_then_allowed(mut doc: Doc) {
    // Arrange
    let twin = doc.arena.create(NewNode::new(NodeKind::Page).named("main"));

    // Act & Assert
    assert_eq!(
        doc.arena.can_insert(doc.document, twin, NO_FLAGS),
        InsertCheckResult::DuplicateName
    );
    assert_eq!(
        doc.arena.can_replace(doc.document, twin, doc.page, NO_FLAGS),
        InsertCheckResult::CanInsert
    );

    let old = doc.arena.replace(doc.document, 0, twin).unwrap();
    assert_eq!(old, doc.page);
    assert_eq!(doc.arena.parent(doc.page).unwrap(), None);
    assert_eq!(doc.arena.items(doc.document).unwrap(), &[twin]);
}

#[rstest]
fn given_non_member_when_checking_replace_then_not_supported(mut doc: Doc) {
    let stranger = doc.arena.create(NodeKind::Page);
    let candidate = doc.arena.create(NodeKind::Page);

    assert_eq!(
        doc.arena.can_replace(doc.document, candidate, stranger, NO_FLAGS),
        InsertCheckResult::NotSupported
    );
}

#[rstest]
fn given_replace_then_single_items_replaced_event(mut doc: Doc) {
    let a = element(&mut doc.arena, "a");
    let b = element(&mut doc.arena, "b");
    doc.arena.push(doc.step, a).unwrap();
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    doc.arena.replace(doc.step, 0, b).unwrap();

    let replaced: Vec<_> = log
        .borrow()
        .iter()
        .filter(|e| e.source() == doc.step)
        .map(|e| e.payload().clone())
        .collect();
    assert_eq!(
        replaced,
        vec![Change::ItemsReplaced {
            index: 0,
            old: vec![a],
            new: vec![b]
        }]
    );
}

#[rstest]
fn given_member_when_removing_and_reinserting_at_same_index_then_order_restored(mut doc: Doc) {
    // Arrange
    let ids: Vec<NodeId> = ["a", "b", "c"]
        .iter()
        .map(|name| element(&mut doc.arena, name))
        .collect();
    for &id in &ids {
        doc.arena.push(doc.step, id).unwrap();
    }
    let before = doc.arena.items(doc.step).unwrap().to_vec();

    // Act
    let index = doc.arena.index_of(doc.step, ids[1]).unwrap().unwrap();
    assert!(doc.arena.remove(doc.step, ids[1]).unwrap());
    doc.arena.insert(doc.step, index, ids[1]).unwrap();

    // Assert
    assert_eq!(doc.arena.items(doc.step).unwrap(), before.as_slice());
}

#[rstest]
fn given_non_member_when_removing_then_false_and_no_event(mut doc: Doc) {
    let a = element(&mut doc.arena, "a");
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    assert!(!doc.arena.remove(doc.step, a).unwrap());
    assert!(log.borrow().is_empty());
}

#[rstest]
fn given_batch_with_duplicate_names_when_inserting_then_nothing_changes(mut doc: Doc) {
    // Arrange
    let g1 = doc.arena.create(NewNode::new(NodeKind::Group).named("g"));
    let g2 = doc.arena.create(NewNode::new(NodeKind::Group).named("g"));
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    // Act
    let result = doc.arena.insert_range(doc.step, 0, &[g1, g2], NO_FLAGS);

    // Assert
    assert_eq!(result.unwrap_err().reason(), Some(StructuralReason::DuplicateName));
    assert!(doc.arena.is_empty(doc.step).unwrap());
    assert_eq!(doc.arena.parent(g1).unwrap(), None);
    assert!(log.borrow().is_empty());
}

#[rstest]
fn given_batch_when_inserting_then_one_items_added_and_order_kept(mut doc: Doc) {
    let existing = element(&mut doc.arena, "x");
    doc.arena.push(doc.step, existing).unwrap();
    let a = element(&mut doc.arena, "a");
    let b = element(&mut doc.arena, "b");
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    doc.arena.insert_range(doc.step, 0, &[a, b], NO_FLAGS).unwrap();

    assert_eq!(doc.arena.items(doc.step).unwrap(), &[a, b, existing]);
    let ops = operations(&log);
    assert_eq!(ops.iter().filter(|&&op| op == "ItemsAdded").count(), 1);
    assert_eq!(ops.iter().filter(|&&op| op == "ParentChanged").count(), 2);
}

#[rstest]
fn given_index_past_end_when_inserting_then_out_of_range(mut doc: Doc) {
    let a = element(&mut doc.arena, "a");

    assert_eq!(
        doc.arena.insert(doc.step, 3, a),
        Err(DomainError::IndexOutOfRange { index: 3, len: 0 })
    );
    assert_eq!(doc.arena.parent(a).unwrap(), None);
}

#[rstest]
fn given_populated_collection_when_clearing_then_one_cleared_and_parents_reset(mut doc: Doc) {
    // Arrange
    let a = element(&mut doc.arena, "a");
    let b = element(&mut doc.arena, "b");
    doc.arena.push(doc.step, a).unwrap();
    doc.arena.push(doc.step, b).unwrap();
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    // Act
    doc.arena.clear(doc.step).unwrap();

    // Assert
    assert!(doc.arena.is_empty(doc.step).unwrap());
    assert_eq!(doc.arena.parent(a).unwrap(), None);
    assert_eq!(operations(&log), vec!["CollectionCleared"]);
}

#[rstest]
fn given_empty_collection_when_clearing_then_no_event(mut doc: Doc) {
    let log = record_changes(&mut doc.arena, doc.step).unwrap();

    doc.arena.clear(doc.step).unwrap();

    assert!(log.borrow().is_empty());
}

#[rstest]
fn given_disposed_candidate_when_checking_then_disposed(mut doc: Doc) {
    let a = element(&mut doc.arena, "a");
    doc.arena.dispose(a).unwrap();

    assert_eq!(
        doc.arena.can_insert(doc.step, a, NO_FLAGS),
        InsertCheckResult::Disposed
    );
}

#[rstest]
fn given_frozen_tree_when_checking_then_frozen_before_structural_reasons(mut doc: Doc) {
    doc.arena.freeze(doc.document).unwrap();
    let page = doc.arena.create(NewNode::new(NodeKind::Page).named("main"));

    // Duplicate name would also apply; state wins
    assert_eq!(
        doc.arena.can_insert(doc.document, page, NO_FLAGS),
        InsertCheckResult::Frozen
    );
}

#[rstest]
fn given_frozen_tree_when_removing_then_frozen(mut doc: Doc) {
    // Arrange
    let a = element(&mut doc.arena, "a");
    doc.arena.push(doc.step, a).unwrap();
    let b = element(&mut doc.arena, "b");
    doc.arena.freeze(doc.document).unwrap();
    let frozen = Err(DomainError::Frozen(doc.step));

    // Act & Assert
    assert_eq!(doc.arena.remove(doc.step, a).map(|_| ()), frozen);
    assert_eq!(
        doc.arena
            .remove_with(doc.step, a, InsertCheckFlags::IGNORE_LOCK)
            .map(|_| ()),
        frozen
    );
    assert_eq!(doc.arena.remove_at(doc.step, 0).map(|_| ()), frozen);
    assert_eq!(doc.arena.clear(doc.step), frozen);
    assert_eq!(doc.arena.replace(doc.step, 0, b).map(|_| ()), frozen);
    assert_eq!(doc.arena.dispose(a), frozen);

    assert_eq!(doc.arena.items(doc.step).unwrap(), &[a]);
    assert!(!doc.arena.is_disposed(a));
    assert!(!doc.arena.is_disposing(a).unwrap());
}

#[rstest]
fn given_batch_with_duplicate_before_disposed_when_inserting_then_disposed_wins(mut doc: Doc) {
    // Arrange
    let existing = doc.arena.create(NewNode::new(NodeKind::Group).named("g"));
    doc.arena.push(doc.step, existing).unwrap();
    let namesake = doc.arena.create(NewNode::new(NodeKind::Group).named("g"));
    let gone = element(&mut doc.arena, "gone");
    doc.arena.dispose(gone).unwrap();

    // Act
    let result = doc.arena.insert_range(doc.step, 1, &[namesake, gone], NO_FLAGS);

    // Assert
    assert_eq!(result, Err(DomainError::Disposed(gone)));
    assert_eq!(doc.arena.items(doc.step).unwrap(), &[existing]);
}
