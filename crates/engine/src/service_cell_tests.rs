// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn initializes_once_and_reuses() {
    let cell: ServiceCell<u32> = ServiceCell::new();
    assert!(!cell.is_initialized());

    let first = cell.get_or_init(false, || Arc::new(1));
    let second = cell.get_or_init(false, || Arc::new(2));
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cell.is_initialized());
}

#[test]
fn run_once_bypasses_the_cell() {
    let cell: ServiceCell<u32> = ServiceCell::new();
    let value = cell.get_or_init(true, || Arc::new(7));
    assert_eq!(*value, 7);
    assert!(!cell.is_initialized());
}

#[test]
fn reset_drops_the_instance() {
    let cell: ServiceCell<u32> = ServiceCell::new();
    let first = cell.get_or_init(false, || Arc::new(1));
    cell.reset();
    assert!(!cell.is_initialized());
    let second = cell.get_or_init(false, || Arc::new(2));
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*second, 2);
}
