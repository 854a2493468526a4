use std::io::BufRead;

/// Outcome of checking a replay's read outputs against a reference file.
#[derive(Debug, Default)]
pub struct Comparison {
    pub total: usize,
    pub matching: usize,
    /// (1-based line, reference value, produced value); capped, see MAX_REPORTED
    pub mismatches: Vec<(usize, u64, u64)>,
    /// Some((reference lines, produced lines)) when the two sequences differ in length
    pub length_skew: Option<(usize, usize)>,
}

/// Only this many mismatches are kept for the report; a diverging engine would
/// otherwise produce millions of identical complaints.
const MAX_REPORTED: usize = 20;

impl Comparison {
    pub fn passed(&self) -> bool {
        self.length_skew.is_none() && self.matching == self.total
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 { 0.0 } else { self.matching as f64 / self.total as f64 * 100.0 }
    }
}

/// Line-by-line numeric comparison of `outputs` against the reference reader. The
/// shorter sequence bounds the compared range; any length difference is recorded
/// as a skew and fails the comparison on its own.
pub fn against_reference<R: BufRead>(outputs: &[u64], reference: R) -> std::io::Result<Comparison> {
    let mut cmp = Comparison::default();
    let mut reference_lines = 0usize;
    for (index, line) in reference.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        reference_lines += 1;
        let expected: u64 = text.parse().map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("reference line {} is not a number: '{}'", index + 1, text),
            )
        })?;
        if reference_lines > outputs.len() {
            continue;
        }
        let produced = outputs[reference_lines - 1];
        cmp.total += 1;
        if produced == expected {
            cmp.matching += 1;
        } else if cmp.mismatches.len() < MAX_REPORTED {
            cmp.mismatches.push((reference_lines, expected, produced));
        }
    }
    if reference_lines != outputs.len() {
        cmp.length_skew = Some((reference_lines, outputs.len()));
    }
    Ok(cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn identical_sequences_pass() {
        let cmp = against_reference(&[1000, 1001, 0], Cursor::new("1000\n1001\n0\n")).unwrap();
        assert!(cmp.passed());
        assert_eq!(cmp.total, 3);
        assert!((cmp.accuracy() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mismatches_are_recorded() {
        let cmp = against_reference(&[1000, 9999, 0], Cursor::new("1000\n1001\n0\n")).unwrap();
        assert!(!cmp.passed());
        assert_eq!(cmp.matching, 2);
        assert_eq!(cmp.mismatches, vec![(2, 1001, 9999)]);
    }

    #[test]
    fn length_skew_fails() {
        let cmp = against_reference(&[1000], Cursor::new("1000\n1001\n")).unwrap();
        assert!(!cmp.passed());
        assert_eq!(cmp.length_skew, Some((2, 1)));
    }

    #[test]
    fn garbage_reference_is_an_error() {
        assert!(against_reference(&[1000], Cursor::new("not-a-number\n")).is_err());
    }
}
