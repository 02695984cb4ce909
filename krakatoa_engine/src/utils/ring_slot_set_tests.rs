use super::*;

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_from_fn_fills_every_slot() {
    let ring = RingSlotSet::from_fn(3, |i| i * 10).unwrap();
    assert_eq!(ring.len(), 3);
    assert_eq!(ring[0], 0);
    assert_eq!(ring[1], 10);
    assert_eq!(ring[2], 20);
    assert_eq!(ring.current_index(), None);
}

#[test]
fn test_zero_slots_rejected() {
    let result = RingSlotSet::from_fn(0, |i| i);
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_try_from_fn_propagates_failure() {
    let mut created = 0;
    let result = RingSlotSet::try_from_fn(4, |i| {
        if i == 2 {
            Err(Error::OutOfMemory)
        } else {
            created += 1;
            Ok(i)
        }
    });
    assert_eq!(result.unwrap_err(), Error::OutOfMemory);
    assert_eq!(created, 2);
}

// ============================================================================
// Cursor
// ============================================================================

#[test]
fn test_current_before_advance_is_error() {
    let mut ring = RingSlotSet::from_fn(2, |i| i).unwrap();
    assert!(ring.current().is_err());
    assert!(ring.current_mut().is_err());
}

#[test]
fn test_first_advance_lands_on_slot_zero() {
    let mut ring = RingSlotSet::from_fn(3, |i| i).unwrap();
    assert_eq!(*ring.advance(), 0);
    assert_eq!(ring.current_index(), Some(0));
    assert_eq!(*ring.current().unwrap(), 0);
}

#[test]
fn test_wraparound_for_every_size() {
    // After N+1 advances the cursor is back where the first advance put it
    for n in 1..=8 {
        let mut ring = RingSlotSet::from_fn(n, |i| i).unwrap();
        let first = *ring.advance();
        for _ in 0..n {
            ring.advance();
        }
        assert_eq!(*ring.current().unwrap(), first, "size {}", n);
    }
}

#[test]
fn test_advance_visits_slots_in_order() {
    let mut ring = RingSlotSet::from_fn(3, |i| i).unwrap();
    let visited: Vec<usize> = (0..7).map(|_| *ring.advance()).collect();
    assert_eq!(visited, vec![0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_single_slot_always_current() {
    let mut ring = RingSlotSet::from_fn(1, |_| "only").unwrap();
    for _ in 0..5 {
        assert_eq!(*ring.advance(), "only");
        assert_eq!(ring.current_index(), Some(0));
    }
}

#[test]
fn test_current_mut_writes_through() {
    let mut ring = RingSlotSet::from_fn(2, |_| 0u32).unwrap();
    ring.advance();
    *ring.current_mut().unwrap() = 7;
    ring.advance();
    *ring.current_mut().unwrap() = 9;
    assert_eq!(ring.into_vec(), vec![7, 9]);
}

// ============================================================================
// Direct access
// ============================================================================

#[test]
fn test_indexed_setup_does_not_move_cursor() {
    let mut ring = RingSlotSet::from_fn(3, |_| String::new()).unwrap();
    for i in 0..ring.len() {
        ring[i] = format!("slot{}", i);
    }
    assert_eq!(ring.current_index(), None);
    assert_eq!(ring.get(1).map(String::as_str), Some("slot1"));
    assert!(ring.get(3).is_none());
}

#[test]
fn test_iter_ignores_cursor() {
    let mut ring = RingSlotSet::from_fn(3, |i| i).unwrap();
    ring.advance();
    ring.advance();
    let all: Vec<usize> = ring.iter().copied().collect();
    assert_eq!(all, vec![0, 1, 2]);
    for slot in ring.iter_mut() {
        *slot += 1;
    }
    assert_eq!((&ring).into_iter().sum::<usize>(), 6);
}
