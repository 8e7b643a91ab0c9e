//! Fold one classification pass into a token's evolving record.
//!
//! Pure function: no I/O, no clock. The caller supplies the existing row
//! (if any) and the pass's `ScanResult`.

use crate::types::{Fetched, PairEvent, ScanResult, TokenRecord};

/// Merge `scan` into `existing` (or a fresh record for `event`).
///
/// - Every pass increments `total_scans`.
/// - A failed pass increments `honeypot_failures` and sets `last_error`.
///   The provider that did answer still has its report merged; timing, age
///   and the ladder are left alone.
/// - A successful pass overwrites each report that came back `Success`,
///   keeps the prior report for `Empty`/`RateLimited`, refreshes timing and
///   age, and samples liquidity into the ladder.
pub fn merge(
    existing: Option<TokenRecord>,
    event: &PairEvent,
    scan: &ScanResult,
    liquidity_multiplier: i64,
) -> TokenRecord {
    let now = scan.completed_at;
    let mut record = existing.unwrap_or_else(|| TokenRecord::new(event, now));
    if record.pair_address.is_empty() {
        record.pair_address = event.pair_address.clone();
    }

    record.total_scans += 1;

    // A provider that answered is merged even when the other one failed.
    apply_reports(&mut record, scan);

    if let Some(error) = scan.failure() {
        record.honeypot_failures += 1;
        record.last_error = Some(error);
        return record;
    }

    record.last_scan_at = now;
    record.age_hours = record.honeypot.as_ref().and_then(|r| r.age_hours(now));

    if let Some(liquidity) = record.current_liquidity() {
        record
            .liquidity
            .record(record.total_scans, liquidity_multiplier, liquidity);
    }

    record.last_error = scan.rate_limit_note();
    record
}

/// Overwrite each report that came back `Success`; identity fields fall
/// back to the security provider's names.
fn apply_reports(record: &mut TokenRecord, scan: &ScanResult) {
    if let Fetched::Success(report) = &scan.honeypot {
        let token = &report.token;
        record.name = token.name.clone().or(record.name.take());
        record.symbol = token.symbol.clone().or(record.symbol.take());
        record.decimals = token.decimals.or(record.decimals);
        record.total_supply = token.total_supply.clone().or(record.total_supply.take());
        record.honeypot = Some(report.clone());
    }

    if let Fetched::Success(report) = &scan.security {
        if record.name.is_none() {
            record.name = report.token_name.clone();
        }
        if record.symbol.is_none() {
            record.symbol = report.token_symbol.clone();
        }
        if record.total_supply.is_none() {
            record.total_supply = report.total_supply.clone();
        }
        record.security = Some(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HoneypotReport, SecurityReport, TokenInfo, TokenStatus};
    use chrono::{Duration, Utc};

    fn event() -> PairEvent {
        PairEvent::new("0xtoken", "0xpair")
    }

    fn honeypot(liquidity: f64, is_honeypot: bool) -> HoneypotReport {
        HoneypotReport {
            token: TokenInfo {
                name: Some("Token".into()),
                symbol: Some("TKN".into()),
                decimals: Some(18),
                ..TokenInfo::default()
            },
            pair_liquidity: liquidity,
            is_honeypot,
            pair_created_at: Some(Utc::now() - Duration::minutes(30)),
            ..HoneypotReport::default()
        }
    }

    fn success(liquidity: f64) -> ScanResult {
        ScanResult {
            honeypot: Fetched::Success(honeypot(liquidity, false)),
            security: Fetched::Success(SecurityReport {
                holder_count: 10,
                ..SecurityReport::default()
            }),
            completed_at: Utc::now(),
        }
    }

    fn failure() -> ScanResult {
        ScanResult {
            honeypot: Fetched::Error("HTTP 502".into()),
            security: Fetched::Empty,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_pass_creates_record() {
        let record = merge(None, &event(), &success(20_000.0), 1);
        assert_eq!(record.total_scans, 1);
        assert_eq!(record.honeypot_failures, 0);
        assert_eq!(record.symbol.as_deref(), Some("TKN"));
        assert_eq!(record.status, TokenStatus::New);
        assert!(record.last_error.is_none());
        let age = record.age_hours.unwrap();
        assert!(age > 0.49 && age < 0.51);
    }

    #[test]
    fn test_failed_pass_preserves_fields() {
        let good = merge(None, &event(), &success(20_000.0), 1);
        let after = merge(Some(good.clone()), &event(), &failure(), 1);

        assert_eq!(after.total_scans, good.total_scans + 1);
        assert_eq!(after.honeypot_failures, good.honeypot_failures + 1);
        assert_eq!(after.last_error.as_deref(), Some("Honeypot API error: HTTP 502"));

        // Everything else is untouched.
        let mut expected = good.clone();
        expected.total_scans = after.total_scans;
        expected.honeypot_failures = after.honeypot_failures;
        expected.last_error = after.last_error.clone();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_failed_pass_merges_surviving_report() {
        let good = merge(None, &event(), &success(20_000.0), 1);
        let scan = ScanResult {
            honeypot: Fetched::Error("Classification pass timed out".into()),
            security: Fetched::Success(SecurityReport {
                holder_count: 99,
                ..SecurityReport::default()
            }),
            completed_at: Utc::now() + Duration::minutes(5),
        };
        let after = merge(Some(good.clone()), &event(), &scan, 1);

        assert_eq!(after.honeypot_failures, 1);
        assert_eq!(after.security.as_ref().unwrap().holder_count, 99);
        assert_eq!(after.honeypot, good.honeypot);
        assert_eq!(after.last_scan_at, good.last_scan_at);
        assert_eq!(after.age_hours, good.age_hours);
        assert_eq!(after.liquidity, good.liquidity);
        assert_eq!(
            after.last_error.as_deref(),
            Some("Honeypot API error: Classification pass timed out")
        );
    }

    #[test]
    fn test_success_clears_last_error() {
        let good = merge(None, &event(), &success(1.0), 1);
        let failed = merge(Some(good), &event(), &failure(), 1);
        let recovered = merge(Some(failed), &event(), &success(2.0), 1);
        assert!(recovered.last_error.is_none());
        assert_eq!(recovered.honeypot_failures, 1);
        assert_eq!(recovered.current_liquidity(), Some(2.0));
    }

    #[test]
    fn test_empty_keeps_prior_report() {
        let good = merge(None, &event(), &success(5_000.0), 1);
        let scan = ScanResult {
            honeypot: Fetched::Empty,
            security: Fetched::RateLimited,
            completed_at: Utc::now(),
        };
        let after = merge(Some(good.clone()), &event(), &scan, 1);
        assert_eq!(after.honeypot, good.honeypot);
        assert_eq!(after.security, good.security);
        assert_eq!(after.honeypot_failures, 0);
        assert_eq!(after.last_error.as_deref(), Some("Rate limited: security"));
        assert!(after.last_scan_at >= good.last_scan_at);
    }

    #[test]
    fn test_age_unset_without_creation_time() {
        let mut report = honeypot(1.0, false);
        report.pair_created_at = None;
        let scan = ScanResult {
            honeypot: Fetched::Success(report),
            security: Fetched::Empty,
            completed_at: Utc::now(),
        };
        assert!(merge(None, &event(), &scan, 1).age_hours.is_none());
    }

    #[test]
    fn test_ladder_written_once_at_milestone() {
        let mut record: Option<TokenRecord> = None;
        for pass in 1..=19 {
            let liquidity = pass as f64 * 100.0;
            record = Some(merge(record, &event(), &success(liquidity), 1));
        }
        let record = record.unwrap();
        assert_eq!(record.total_scans, 19);
        assert_eq!(record.liquidity.get(10), Some(1_000.0));
        assert_eq!(record.liquidity.written(), 1);
    }

    #[test]
    fn test_failed_pass_skips_ladder() {
        let mut record = merge(None, &event(), &success(1.0), 1);
        record.total_scans = 9;
        let after = merge(Some(record), &event(), &failure(), 1);
        assert_eq!(after.total_scans, 10);
        assert_eq!(after.liquidity.get(10), None);
    }
}
