//! Invoice number formatting.
//!
//! Format: `INV-<tenant_short>-<yyyymmdd>-<base32(seq)>` where tenant_short
//! is the first 8 hex digits of the tenant UUID and seq is the per-tenant
//! monotonic counter from `invoice_sequences`. Numbers are gap-tolerant: a
//! rolled-back issuance burns its sequence value.

use chrono::NaiveDate;
use uuid::Uuid;

/// Crockford base32 alphabet (no I, L, O, U).
const BASE32_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

fn base32(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; 13];
    let mut pos = buf.len();
    while value > 0 {
        pos -= 1;
        buf[pos] = BASE32_ALPHABET[(value % 32) as usize];
        value /= 32;
    }
    String::from_utf8_lossy(&buf[pos..]).into_owned()
}

/// Render the invoice number for a tenant, issue date, and allocated
/// sequence value.
pub fn format_invoice_number(tenant_id: Uuid, invoice_date: NaiveDate, seq: i64) -> String {
    let tenant_short = &tenant_id.simple().to_string()[..8];
    format!(
        "INV-{}-{}-{}",
        tenant_short,
        invoice_date.format("%Y%m%d"),
        base32(seq as u64)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn format_includes_tenant_date_and_sequence() {
        let tenant = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let number = format_invoice_number(tenant, d("2026-03-01"), 1);
        assert_eq!(number, "INV-a1b2c3d4-20260301-1");
    }

    #[test]
    fn base32_encoding_is_crockford() {
        assert_eq!(base32(0), "0");
        assert_eq!(base32(31), "Z");
        assert_eq!(base32(32), "10");
        assert_eq!(base32(1024), "100");
        // Ambiguous letters are excluded from the alphabet.
        for c in ['I', 'L', 'O', 'U'] {
            assert!(!BASE32_ALPHABET.contains(&(c as u8)));
        }
    }

    #[test]
    fn sequence_ordering_is_reflected_for_same_width() {
        let tenant = Uuid::new_v4();
        let date = d("2026-03-01");
        let a = format_invoice_number(tenant, date, 100);
        let b = format_invoice_number(tenant, date, 101);
        assert!(a < b);
        assert_ne!(a, b);
    }
}
