//! Splitting command text into trimmed statement fragments.

/// One semicolon-delimited statement: a byte range of the command text with
/// surrounding whitespace excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub start: usize,
    pub len: usize,
}

impl Fragment {
    /// The fragment's text within `source`.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.start..self.start + self.len).unwrap_or_default()
    }

    /// Last byte of the fragment.
    pub fn last_byte(&self, source: &str) -> Option<u8> {
        self.text(source).as_bytes().last().copied()
    }
}

#[derive(Clone, Copy)]
enum State {
    Unquoted,
    /// Inside a literal. `closing` is set after a `'` that may end it.
    Quoted { closing: bool },
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Tracks the extent of the fragment being scanned.
#[derive(Default)]
struct Extent {
    start: Option<usize>,
    end: usize,
}

impl Extent {
    fn include(&mut self, pos: usize) {
        self.start.get_or_insert(pos);
        self.end = pos + 1;
    }

    fn flush(&mut self, out: &mut Vec<Fragment>) {
        if let Some(start) = self.start.take() {
            out.push(Fragment {
                start,
                len: self.end - start,
            });
        }
    }
}

/// Split `text` into statement fragments.
///
/// Semicolons inside single-quoted literals do not split, and a doubled
/// quote (`''`) inside a literal keeps it open. Empty statements are dropped.
pub fn split_statements(text: &str) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut extent = Extent::default();
    let mut state = State::Unquoted;

    for (pos, &b) in text.as_bytes().iter().enumerate() {
        // a byte may need a second look after a literal closes
        loop {
            match state {
                State::Unquoted => match b {
                    b'\'' => {
                        extent.include(pos);
                        state = State::Quoted { closing: false };
                    }
                    b';' => extent.flush(&mut fragments),
                    _ if is_space(b) => {}
                    _ => extent.include(pos),
                },
                State::Quoted { closing } => {
                    if b == b'\'' {
                        state = State::Quoted { closing: !closing };
                    } else if closing {
                        state = State::Unquoted;
                        continue;
                    }
                    extent.include(pos);
                }
            }
            break;
        }
    }
    extent.flush(&mut fragments);
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<&str> {
        split_statements(src).iter().map(|f| f.text(src)).collect()
    }

    #[test]
    fn two_statements() {
        assert_eq!(texts("SELECT 1; SELECT 2"), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn trims_and_drops_empty() {
        assert_eq!(texts("  \r\n;; SELECT  1 \t;\n "), vec!["SELECT  1"]);
        assert!(texts("").is_empty());
        assert!(texts(" ; ;").is_empty());
    }

    #[test]
    fn semicolon_inside_literal() {
        assert_eq!(
            texts("INSERT INTO t VALUES ('a;b'); SELECT 2"),
            vec!["INSERT INTO t VALUES ('a;b')", "SELECT 2"]
        );
    }

    #[test]
    fn doubled_quote_stays_quoted() {
        let src = "SELECT 'it''s; fine' ; SELECT 3";
        assert_eq!(texts(src), vec!["SELECT 'it''s; fine'", "SELECT 3"]);
    }

    #[test]
    fn literal_at_end_of_text() {
        assert_eq!(texts("SELECT 'x'"), vec!["SELECT 'x'"]);
        assert_eq!(texts("SELECT ''"), vec!["SELECT ''"]);
    }

    #[test]
    fn whitespace_inside_literal_is_kept() {
        assert_eq!(texts("SELECT '  ' "), vec!["SELECT '  '"]);
    }

    #[test]
    fn matches_naive_split_without_quotes() {
        let samples = [
            "a;b;c",
            " select 1 ;\n\tselect 2;",
            ";;;",
            "update t set x = 1 where y = 2; delete from t",
            "\r\nvacuum\r\n",
        ];
        for src in samples {
            let naive: Vec<&str> = src
                .split(';')
                .map(|s| s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n')))
                .filter(|s| !s.is_empty())
                .collect();
            assert_eq!(texts(src), naive, "source: {src:?}");
        }
    }

    #[test]
    fn multibyte_text() {
        assert_eq!(texts("SELECT 'é;'; SELECT 'ü'"), vec!["SELECT 'é;'", "SELECT 'ü'"]);
    }
}
