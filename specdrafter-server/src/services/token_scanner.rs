//! Streaming control-token detection
//!
//! Visible text arrives in arbitrary fragments, so a token may straddle
//! fragment boundaries. The scanner forwards text as soon as it can no longer
//! be part of the token and holds back only a suffix that is still a prefix
//! of it.

/// Output of [`ControlTokenScanner::push`], in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutput {
    /// Text safe to relay
    Text(String),
    /// One occurrence of the token, already removed from the text
    Token,
}

#[derive(Debug)]
pub struct ControlTokenScanner {
    token: &'static str,
    pending: String,
}

impl ControlTokenScanner {
    pub fn new(token: &'static str) -> Self {
        Self {
            token,
            pending: String::new(),
        }
    }

    /// Feed one fragment; returns what can be released now
    pub fn push(&mut self, fragment: &str) -> Vec<ScanOutput> {
        let mut out = Vec::new();
        if self.token.is_empty() {
            if !fragment.is_empty() {
                out.push(ScanOutput::Text(fragment.to_string()));
            }
            return out;
        }

        self.pending.push_str(fragment);

        while let Some(pos) = self.pending.find(self.token) {
            if pos > 0 {
                out.push(ScanOutput::Text(self.pending[..pos].to_string()));
            }
            out.push(ScanOutput::Token);
            self.pending.drain(..pos + self.token.len());
        }

        let hold = self.partial_suffix_len();
        let release = self.pending.len() - hold;
        if release > 0 {
            let text: String = self.pending.drain(..release).collect();
            out.push(ScanOutput::Text(text));
        }

        out
    }

    /// End of stream: release whatever was held back
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Length of the longest suffix of `pending` that begins the token
    fn partial_suffix_len(&self) -> usize {
        let max = self.pending.len().min(self.token.len() - 1);
        (1..=max)
            .rev()
            .find(|&len| {
                let start = self.pending.len() - len;
                self.pending.is_char_boundary(start)
                    && self.token.starts_with(&self.pending[start..])
            })
            .unwrap_or(0)
    }
}
