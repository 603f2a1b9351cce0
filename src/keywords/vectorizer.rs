use std::collections::HashSet;

/// English stop words. A stop word ends the current phrase and is never part
/// of a candidate.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "almost", "also", "although",
    "always", "am", "among", "an", "and", "another", "any", "anyone", "anything", "are", "around",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "cannot", "could", "did", "do", "does", "doing", "done", "down", "during",
    "each", "either", "else", "enough", "etc", "even", "ever", "every", "few", "for", "from",
    "further", "get", "gets", "got", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "however", "i", "if", "in", "into", "is", "it",
    "its", "itself", "just", "least", "less", "let", "like", "made", "make", "many", "may", "me",
    "might", "more", "most", "much", "must", "my", "myself", "neither", "never", "no", "nor",
    "not", "now", "of", "off", "often", "on", "once", "one", "only", "or", "other", "others",
    "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps", "quite", "rather",
    "really", "same", "see", "seem", "seems", "several", "shall", "she", "should", "since", "so",
    "some", "something", "sometimes", "still", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "though", "through",
    "thus", "to", "too", "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well",
    "were", "what", "whatever", "when", "where", "whether", "which", "while", "who", "whom",
    "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
    "yourself", "yourselves",
];

/// Candidate phrase generator.
///
/// Phrases are maximal runs of content words: punctuation, stop words,
/// numbers and single characters all end a run. Runs longer than
/// `max_words` are cut into consecutive chunks.
#[derive(Debug, Clone)]
pub struct PhraseVectorizer {
    max_words: usize,
    stop_words: HashSet<&'static str>,
}

impl PhraseVectorizer {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Distinct candidate phrases in first-seen order.
    pub fn candidates(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut run: Vec<String> = Vec::new();

        let mut flush = |run: &mut Vec<String>, out: &mut Vec<String>| {
            for chunk in run.chunks(self.max_words) {
                let phrase = chunk.join(" ");
                if seen.insert(phrase.clone()) {
                    out.push(phrase);
                }
            }
            run.clear();
        };

        for segment in text.split(is_phrase_break) {
            for raw in segment.split_whitespace() {
                let word = raw
                    .trim_matches(|c: char| c == '\'' || c == '-' || c == '’')
                    .to_lowercase();
                if self.is_content_word(&word) {
                    run.push(word);
                } else {
                    flush(&mut run, &mut out);
                }
            }
            flush(&mut run, &mut out);
        }
        out
    }

    fn is_content_word(&self, word: &str) -> bool {
        word.chars().count() > 1
            && word.chars().any(char::is_alphabetic)
            && !self.stop_words.contains(word)
    }
}

impl Default for PhraseVectorizer {
    fn default() -> Self {
        Self::new(3)
    }
}

fn is_phrase_break(c: char) -> bool {
    !(c.is_alphanumeric() || c.is_whitespace() || c == '\'' || c == '-' || c == '’')
}
