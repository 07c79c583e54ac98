use pagevec::{PageVec, stats};

// The counters are process-wide, so everything that reads them lives in this
// one test function: integration test binaries run in their own process, and
// a single #[test] cannot race against itself.
#[test]
fn growth_is_amortized_and_observable() {
    stats::reset();

    let n = 100_000u64;
    let mut v = PageVec::new();
    for i in 0..n {
        v.push(i);
    }
    assert_eq!(v.len(), n as usize);

    // Doubling growth: O(log n) capacity changes, not O(n).
    let growths = stats::growth_count();
    assert!(growths > 0);
    assert!(
        growths < 40,
        "expected O(log n) capacity changes, got {growths}"
    );
    // A resize can only skip the move if it happened at all.
    assert!(stats::remap_skip_count() <= growths);

    // Reserving up front performs no growth at all.
    stats::reset();
    let mut v: PageVec<u64> = PageVec::with_capacity(n as usize);
    for i in 0..n {
        v.push(i);
    }
    assert_eq!(stats::growth_count(), 0);
    assert_eq!(stats::remap_skip_count(), 0);

    stats::reset();
}
