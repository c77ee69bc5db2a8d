use proptest::prelude::*;

use crate::mode::{Mode, MultiWriter, SingleWriter};
use crate::{Arena, ArenaCore, HeapSupplier};

use super::{fill, holds, is_aligned};

const MAX_BUFFER_SIZE: usize = 512;

/// Sequences of `(size, log2(alignment))` requests.
fn requests_strategy() -> impl Strategy<Value = Vec<(usize, u32)>> {
    prop::collection::vec((0usize..300, 0u32..7), 1..200)
}

fn check_requests<M: Mode>(
    requests: &[(usize, u32)],
    initial: usize,
) -> Result<(), TestCaseError> {
    let mut arena = ArenaCore::<M, HeapSupplier>::new(initial, MAX_BUFFER_SIZE);
    let mut live = Vec::with_capacity(requests.len());
    let mut last_footprint = arena.memory_footprint();

    for (i, &(size, align_log2)) in requests.iter().enumerate() {
        let align = 1usize << align_log2;
        let ptr = arena.allocate_aligned(size, align).unwrap();
        prop_assert!(is_aligned(ptr, align), "{ptr:p} not aligned to {align}");

        let byte = u8::try_from(i % 251).unwrap();
        fill(ptr, size, byte);
        live.push((ptr, size, byte));

        let footprint = arena.memory_footprint();
        prop_assert!(footprint >= last_footprint);
        last_footprint = footprint;
    }

    for &(ptr, size, byte) in &live {
        prop_assert!(holds(ptr, size, byte), "allocation at {ptr:p} was overwritten");
    }

    let capacities = arena.capacities();
    prop_assert!(capacities.iter().all(|&c| c <= MAX_BUFFER_SIZE));
    prop_assert_eq!(capacities.iter().sum::<usize>(), arena.memory_footprint());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn single_writer_allocations_are_aligned_and_disjoint(
        requests in requests_strategy(),
        initial in 0usize..256,
    ) {
        check_requests::<SingleWriter>(&requests, initial)?;
    }

    #[test]
    fn multi_writer_allocations_are_aligned_and_disjoint(
        requests in requests_strategy(),
        initial in 0usize..256,
    ) {
        check_requests::<MultiWriter>(&requests, initial)?;
    }

    #[test]
    fn reset_retains_exactly_the_last_buffer(
        requests in requests_strategy(),
        initial in 1usize..256,
    ) {
        let mut arena = Arena::new(initial, MAX_BUFFER_SIZE);
        for &(size, align_log2) in &requests {
            arena.allocate_aligned(size, 1 << align_log2).unwrap();
        }
        let last = *arena.capacities().last().unwrap();

        arena.reset();
        prop_assert_eq!(arena.memory_footprint(), last);
        prop_assert_eq!(arena.component_count(), 1);
        prop_assert_eq!(arena.current_used(), 0);
    }
}
