#![no_main]

use ledgerline_core::order::OrderKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (lo, hi) = data;
    let (Ok(lo), Ok(hi)) = (OrderKey::parse(lo), OrderKey::parse(hi)) else {
        return;
    };
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    match OrderKey::between(Some(&lo), Some(&hi)) {
        Ok(mid) => {
            assert!(lo < mid && mid < hi, "{lo} < {mid} < {hi}");
            assert!(OrderKey::parse(mid.as_str()).is_ok());
        }
        Err(_) => assert_eq!(lo, hi),
    }
    assert!(lo < lo.after());
});
