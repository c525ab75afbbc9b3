//! VAT computation, consumed as a pure function.
//!
//! Intent amounts are tax-inclusive gross values; invoices display the
//! net/tax split. The engine never adjusts the charged amount based on tax.

/// Net/tax/gross split of a tax-inclusive amount, all in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxBreakdown {
    pub net_cents: i64,
    pub tax_cents: i64,
    pub gross_cents: i64,
}

/// Split a tax-inclusive gross amount at `rate_bps` basis points
/// (1600 = 16%). Rounds the net down so net + tax == gross exactly.
pub fn breakdown(gross_cents: i64, rate_bps: i64) -> TaxBreakdown {
    let net_cents = gross_cents * 10_000 / (10_000 + rate_bps);
    TaxBreakdown {
        net_cents,
        tax_cents: gross_cents - net_cents,
        gross_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sixteen_percent() {
        let b = breakdown(116_000, 1600);
        assert_eq!(b.net_cents, 100_000);
        assert_eq!(b.tax_cents, 16_000);
        assert_eq!(b.gross_cents, 116_000);
    }

    #[test]
    fn net_plus_tax_equals_gross() {
        for gross in [1, 99, 100, 101, 333, 100_001] {
            let b = breakdown(gross, 1600);
            assert_eq!(b.net_cents + b.tax_cents, b.gross_cents);
        }
    }

    #[test]
    fn zero_rate_is_all_net() {
        let b = breakdown(50_000, 0);
        assert_eq!(b.net_cents, 50_000);
        assert_eq!(b.tax_cents, 0);
    }
}
