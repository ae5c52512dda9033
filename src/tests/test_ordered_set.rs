use crate::fsm::OrderedSet;

#[test]
fn ordered_set_can_add_and_delete() {
    let mut os: OrderedSet<String> = OrderedSet::new();

    os.add("Abc".to_string());
    os.add("def".to_string());
    os.add("ghi".to_string());
    os.add("xyz".to_string());
    assert_eq!(os.size(), 4);

    os.delete(&"Abc".to_string());
    os.delete(&"ghi".to_string());
    os.delete(&"xxx".to_string());
    os.delete(&"Abc".to_string()); // should be ignored.

    assert_eq!(os.size(), 2);
}

#[test]
fn ordered_set_keeps_insertion_order() {
    let mut os: OrderedSet<u32> = OrderedSet::new();
    os.add(3);
    os.add(1);
    os.add(2);
    os.add(1); // duplicate, ignored
    let l = os.to_list();
    let v: Vec<u32> = l.iterator().cloned().collect();
    assert_eq!(v, vec![3, 1, 2]);
}

#[test]
fn ordered_set_can_union() {
    let mut os1: OrderedSet<String> = OrderedSet::new();
    os1.add("Abc".to_string());
    os1.add("def1".to_string());

    let mut os2: OrderedSet<String> = OrderedSet::new();
    os2.add("Abc".to_string());
    os2.add("def2".to_string());

    os1.union(&os2);

    assert_eq!(os1.size(), 3);
    assert!(os1.is_member(&"def2".to_string()));
    assert!(os1.is_member(&"Abc".to_string()));
}

#[test]
fn ordered_set_intersection_check() {
    let mut os1: OrderedSet<u32> = OrderedSet::new();
    os1.add(1);
    os1.add(2);
    let mut os2: OrderedSet<u32> = OrderedSet::new();
    os2.add(3);
    assert!(!os1.has_intersection(&os2));
    os2.add(2);
    assert!(os1.has_intersection(&os2));
}

#[test]
fn ordered_set_some_and_every() {
    let mut os: OrderedSet<u32> = OrderedSet::new();
    assert!(!os.some(&|_| true));
    assert!(os.every(&|_| false));
    os.add(2);
    os.add(4);
    assert!(os.every(&|v| v % 2 == 0));
    assert!(os.some(&|v| *v == 4));
    assert!(!os.some(&|v| *v == 5));
}
