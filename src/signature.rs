//! DER signature parsing and r-value normalization

/// Canonical identity rule for r-values: the hex digit string with leading
/// `'0'` characters stripped. An all-zero value normalizes to the empty
/// string. Two r-values are equal iff their normalized strings are equal.
pub fn normalize_r(r_hex: &str) -> &str {
    r_hex.trim_start_matches('0')
}

/// Whether a script was parsed to its end or abandoned at a structural
/// inconsistency (declared lengths overrunning the data, undecodable hex).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    Complete,
    Partial,
}

/// Result of scanning one script: the normalized r-values found, in script
/// order, plus whether the scan covered the whole script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub r_values: Vec<String>,
    pub outcome: ExtractOutcome,
}

impl Extraction {
    fn partial(r_values: Vec<String>) -> Self {
        Extraction {
            r_values,
            outcome: ExtractOutcome::Partial,
        }
    }

    fn complete(r_values: Vec<String>) -> Self {
        Extraction {
            r_values,
            outcome: ExtractOutcome::Complete,
        }
    }
}

const SEQUENCE_TAG: u8 = 0x30;
const INTEGER_TAG: u8 = 0x02;

/// Extracts the r-value of every DER ECDSA signature found by a single
/// left-to-right pass over a hex-encoded script.
///
/// The scan is conservative rather than a script disassembler: it expects a
/// SEQUENCE tag at the cursor and stops at the first byte that is not one.
/// Within a SEQUENCE, the first element must be an INTEGER for an r-value to
/// be emitted; the cursor then advances past the declared SEQUENCE extent,
/// so scripts with several concatenated signatures (multisig) yield several
/// values. Malformed input never fails: whatever was parseable before the
/// first inconsistency is returned and the rest of the script is skipped.
pub fn extract_r_values(script_hex: &str) -> Extraction {
    let Ok(script) = hex::decode(script_hex) else {
        return Extraction::partial(Vec::new());
    };

    let mut r_values = Vec::new();
    let mut cursor = 0usize;

    while cursor + 2 < script.len() {
        if script[cursor] != SEQUENCE_TAG {
            break;
        }
        let content_len = script[cursor + 1] as usize;
        let sequence_end = cursor + 2 + content_len;

        if script.get(cursor + 2) == Some(&INTEGER_TAG) {
            let Some(&r_len) = script.get(cursor + 3) else {
                return Extraction::partial(r_values);
            };
            let r_start = cursor + 4;
            let r_end = r_start + r_len as usize;
            if r_end > script.len() || r_end > sequence_end {
                // The INTEGER claims more bytes than exist; emitting a
                // truncated value would corrupt the identity notion.
                return Extraction::partial(r_values);
            }
            let r_hex = hex::encode(&script[r_start..r_end]);
            r_values.push(normalize_r(&r_hex).to_string());
        }

        cursor = sequence_end;
    }

    Extraction::complete(r_values)
}
