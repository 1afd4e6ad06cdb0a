#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mixq::config::OffsetSearch;
use mixq::quant::{fit_groups, search_groups};

/// Fuzz target for the channel-group offset search
///
/// A successful search covers every channel, picks a count within bounds,
/// and no smaller count fits at least as well.

#[derive(Arbitrary, Debug)]
struct SearchFuzzInput {
    minima: Vec<i16>,
    unit_index: u8,
    max_groups: u8,
    max_multiple: u8,
}

fuzz_target!(|input: SearchFuzzInput| {
    let minima: Vec<f32> = input.minima.iter().take(512).map(|&v| v as f32 / 1000.0).collect();
    let unit = -[0.0, 0.3125, 0.278_464_55][input.unit_index as usize % 3];
    let search = OffsetSearch {
        max_multiple: (input.max_multiple % 8) as usize,
        max_groups: (input.max_groups % 8) as usize,
        ..OffsetSearch::default()
    };

    let Ok(best) = search_groups(&minima, unit, &search) else {
        return;
    };
    assert_eq!(best.targets.len(), minima.len());
    assert!(best.groups >= 1 && best.groups <= search.max_groups);
    for g in 1..best.groups {
        if let Ok(fit) = fit_groups(&minima, unit, g, &search) {
            assert!(fit.error > best.error);
        }
    }
});
