/// Shell prompt heuristic: the trimmed line ends with `#` (root) or `$`.
///
/// Known gap: command output whose line legitimately ends with either
/// character is mistaken for the prompt and cuts the result short.
pub fn is_command_prompt(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.ends_with('#') || trimmed.ends_with('$')
}

/// Splits raw pipe chunks into lines. A trailing fragment that looks like a
/// prompt is emitted immediately, since the shell prints its prompt without
/// a newline and then blocks waiting for input.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(index) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=index).collect();
            lines.push(decode(&raw));
        }
        if !self.pending.is_empty() {
            let fragment = decode(&self.pending);
            if is_command_prompt(&fragment) {
                self.pending.clear();
                lines.push(fragment);
            }
        }
        lines
    }

    /// Flushes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode(&raw))
    }
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
