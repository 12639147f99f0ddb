use std::cmp::Ordering;

use vaquita::data::heap::PairingHeap;

fn cmp(a: &i32, b: &i32) -> Ordering {
    a.cmp(b)
}

#[test]
fn heap_pop_returns_none_on_an_empty_heap() {
    let mut heap: PairingHeap<i32> = PairingHeap::new();
    assert!(heap.is_empty());
    assert_eq!(heap.pop(&mut cmp), None);
}

#[test]
fn heap_pop_returns_items_in_ascending_order() {
    let mut heap = PairingHeap::new();
    for x in [5, 1, 4, 1, 3, 9, 2, 6] {
        heap.push(x, &mut cmp);
    }
    let mut drained = Vec::new();
    while let Some(x) = heap.pop(&mut cmp) {
        drained.push(x);
    }
    assert_eq!(drained, vec![1, 1, 2, 3, 4, 5, 6, 9]);
}

#[test]
fn heap_peek_returns_the_minimum_without_removing_it() {
    let mut heap = PairingHeap::new();
    heap.push(7, &mut cmp);
    heap.push(3, &mut cmp);
    heap.push(11, &mut cmp);
    assert_eq!(heap.peek(), Some(&3));
    assert_eq!(heap.len(), 3);
}

#[test]
fn heap_merge_absorbs_all_items_from_the_other_heap() {
    let mut a = PairingHeap::new();
    let mut b = PairingHeap::new();
    for x in [10, 30, 50] {
        a.push(x, &mut cmp);
    }
    for x in [20, 40, 5] {
        b.push(x, &mut cmp);
    }
    a.merge(b, &mut cmp);
    assert_eq!(a.len(), 6);
    let mut drained = Vec::new();
    while let Some(x) = a.pop(&mut cmp) {
        drained.push(x);
    }
    assert_eq!(drained, vec![5, 10, 20, 30, 40, 50]);
}

#[test]
fn heap_merge_with_an_empty_heap_keeps_the_contents() {
    let mut a = PairingHeap::new();
    a.push(2, &mut cmp);
    a.merge(PairingHeap::new(), &mut cmp);
    assert_eq!(a.len(), 1);
    assert_eq!(a.pop(&mut cmp), Some(2));

    let mut empty: PairingHeap<i32> = PairingHeap::new();
    let mut other = PairingHeap::new();
    other.push(8, &mut cmp);
    empty.merge(other, &mut cmp);
    assert_eq!(empty.pop(&mut cmp), Some(8));
}

#[test]
fn heap_interleaved_push_and_pop_keeps_the_order_invariant() {
    let mut heap = PairingHeap::new();
    heap.push(4, &mut cmp);
    heap.push(2, &mut cmp);
    assert_eq!(heap.pop(&mut cmp), Some(2));
    heap.push(1, &mut cmp);
    heap.push(3, &mut cmp);
    assert_eq!(heap.pop(&mut cmp), Some(1));
    assert_eq!(heap.pop(&mut cmp), Some(3));
    assert_eq!(heap.pop(&mut cmp), Some(4));
    assert!(heap.is_empty());
}
