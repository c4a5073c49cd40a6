//! Text shaping for speech synthesis
//!
//! Buffering cuts the assistant stream on sentence/length boundaries so
//! each synthesis request carries a speakable unit; preprocessing expands
//! spelled-out abbreviations and tidies punctuation runs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Abbreviations expanded before synthesis, matched on word boundaries.
static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("UI", "user interface"),
        ("API", "A P I"),
        ("CEO", "C E O"),
        ("CTO", "C T O"),
        ("VC", "venture capital"),
        ("SaaS", "Software as a Service"),
        ("AI", "artificial intelligence"),
        ("ML", "machine learning"),
    ]
    .iter()
    .map(|(abbr, expansion)| {
        // Abbreviations are matched case-sensitively; "ai" inside a word
        // must not expand.
        (
            Regex::new(&format!(r"\b{}\b", regex::escape(abbr))).expect("static pattern"),
            *expansion,
        )
    })
    .collect()
});

static DOT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("static pattern"));
static BANG_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").expect("static pattern"));
static QUESTION_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").expect("static pattern"));

/// True when the buffered text ends at a sentence terminator, optionally
/// followed by whitespace.
pub fn ends_at_sentence(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.' | '!' | '?'))
}

/// Prepare one flush segment for the synthesizer.
pub fn preprocess_for_speech(text: &str) -> String {
    let mut out = text.trim().to_string();
    if out.is_empty() {
        return out;
    }

    for (pattern, expansion) in ABBREVIATIONS.iter() {
        out = pattern.replace_all(&out, *expansion).into_owned();
    }

    // Runs of dots become an ellipsis; runs of !/? collapse to one.
    out = DOT_RUN.replace_all(&out, "...").into_owned();
    out = BANG_RUN.replace_all(&out, "!").into_owned();
    out = QUESTION_RUN.replace_all(&out, "?").into_owned();

    if !ends_at_sentence(&out) {
        out.push('.');
    }
    out
}

/// Accumulates streamed text and cuts flush segments.
///
/// Segments are returned raw (preprocessing happens at synthesis time) so
/// the concatenation of all segments equals the streamed text exactly.
#[derive(Debug)]
pub struct SentenceBuffer {
    buffer: String,
    max_chars: usize,
}

impl SentenceBuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buffer: String::new(),
            max_chars,
        }
    }

    /// Append a chunk; returns a segment when the buffer is flushable.
    pub fn push(&mut self, text: &str) -> Option<String> {
        self.buffer.push_str(text);
        if ends_at_sentence(&self.buffer) || self.buffer.chars().count() >= self.max_chars {
            return self.take();
        }
        None
    }

    /// Drain whatever remains.
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn take(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_abbreviations_on_word_boundaries() {
        assert_eq!(
            preprocess_for_speech("Our AI improves the UI."),
            "Our artificial intelligence improves the user interface."
        );
        // No expansion inside words.
        assert_eq!(preprocess_for_speech("Said the maid."), "Said the maid.");
    }

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(preprocess_for_speech("Wait...."), "Wait...");
        assert_eq!(preprocess_for_speech("Wow!!!"), "Wow!");
        assert_eq!(preprocess_for_speech("Really???"), "Really?");
    }

    #[test]
    fn appends_terminal_period() {
        assert_eq!(preprocess_for_speech("hello there"), "hello there.");
        assert_eq!(preprocess_for_speech("done!"), "done!");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(preprocess_for_speech("   "), "");
    }

    #[test]
    fn flushes_on_sentence_boundary() {
        let mut buffer = SentenceBuffer::new(120);
        assert!(buffer.push("Hello ").is_none());
        assert_eq!(buffer.push("there. ").unwrap(), "Hello there. ");
    }

    #[test]
    fn flushes_on_length() {
        let mut buffer = SentenceBuffer::new(120);
        let long = "a".repeat(119);
        assert!(buffer.push(&long).is_none());
        let segment = buffer.push("bb").unwrap();
        assert_eq!(segment.chars().count(), 121);
    }

    #[test]
    fn segments_partition_the_stream() {
        let chunks = ["Well", ", let's see. ", "Here is one idea", " for you!", " And more"];
        let mut buffer = SentenceBuffer::new(120);
        let mut segments = Vec::new();
        for chunk in chunks {
            if let Some(segment) = buffer.push(chunk) {
                segments.push(segment);
            }
        }
        if let Some(rest) = buffer.finish() {
            segments.push(rest);
        }

        for segment in &segments[..segments.len() - 1] {
            assert!(ends_at_sentence(segment) || segment.chars().count() >= 120);
        }
        assert_eq!(segments.concat(), chunks.concat());
    }
}
