//! Issue designation parsing
//!
//! Comic issues are not always numbers: `"1"`, `"-1"`, `"1.5"`, `"½"`,
//! `"12AU"` and `"Annual"` all occur. [`IssueNumber`] splits a designation into
//! a leading numeric part and a free-text suffix so that issues can be sorted
//! numerically when possible.

/// A parsed issue designation.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueNumber {
    numeric: Option<String>,
    suffix: String,
}

impl IssueNumber {
    /// Split `text` into a numeric prefix and a suffix.
    ///
    /// The numeric prefix is an optional `-` followed by digits containing at
    /// most one `.`. A trailing `.` that is followed by more text belongs to
    /// the suffix. Text that does not start with a digit or `.` (after an
    /// optional `-`) is all suffix.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let chars: Vec<char> = text.chars().collect();

        let start = usize::from(chars.first() == Some(&'-'));
        let numeric_start = chars
            .get(start)
            .is_some_and(|c| c.is_ascii_digit() || *c == '.');

        if !numeric_start {
            return Self {
                numeric: None,
                suffix: text.to_string(),
            };
        }

        let mut end = start;
        let mut seen_dot = false;
        while let Some(&c) = chars.get(end) {
            if c == '.' {
                if seen_dot {
                    break;
                }
                seen_dot = true;
            } else if !c.is_ascii_digit() {
                break;
            }
            end += 1;
        }

        if chars[end - 1] == '.' && end != chars.len() {
            end -= 1;
        }

        if end == start {
            // Only a sign survived; it reads as part of the suffix.
            end = 0;
        }

        let numeric: String = chars[..end].iter().collect();
        let suffix: String = chars[end..].iter().collect();

        Self {
            numeric: (!numeric.is_empty()).then_some(numeric),
            suffix,
        }
    }

    /// The numeric prefix exactly as written, e.g. `"007"` or `"-1"`.
    pub fn numeric_part(&self) -> Option<&str> {
        self.numeric.as_deref()
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Sortable value of the designation.
    ///
    /// A `½` suffix adds one half. Returns `None` when there is no usable
    /// numeric part.
    pub fn as_f64(&self) -> Option<f64> {
        let value = self
            .numeric
            .as_deref()
            .and_then(|n| n.parse::<f64>().ok());

        if self.suffix == "½" {
            return Some(value.unwrap_or(0.0) + 0.5);
        }

        value
    }
}
