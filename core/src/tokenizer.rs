use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    /// Closed-class English words: determiners, pronouns, prepositions,
    /// conjunctions, auxiliaries and modals.
    static ref CLOSED_CLASS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","also","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","either","every","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "just","let's","may","me","might","more","most","must","mustn't","my","myself",
            "neither","no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","shall","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","upon","us","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","whose","why","why's","will","with","within","without","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Decides whether a lowercased token belongs to an open word class
/// (nouns, adjectives) and should be indexed.
///
/// This is the seam for a part-of-speech tagger; the default
/// [`ClosedClassFilter`] rejects a fixed list of function words.
pub trait TermClassifier: Send + Sync {
    fn is_open_class(&self, token: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ClosedClassFilter;

impl TermClassifier for ClosedClassFilter {
    fn is_open_class(&self, token: &str) -> bool {
        !CLOSED_CLASS.contains(token)
    }
}

/// Turns raw text into an ordered sequence of indexable terms.
#[derive(Clone)]
pub struct Normalizer {
    classifier: Arc<dyn TermClassifier>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Arc::new(ClosedClassFilter))
    }
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(classifier: Arc<dyn TermClassifier>) -> Self {
        Self { classifier }
    }

    /// NFKC-normalize, lowercase, split into word tokens, keep open-class
    /// tokens and stem them. Order and repetitions are preserved.
    pub fn normalize(&self, text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut terms = Vec::new();
        for mat in RE.find_iter(&normalized) {
            let token = mat.as_str();
            if !self.classifier.is_open_class(token) {
                continue;
            }
            terms.push(STEMMER.stem(token).into_owned());
        }
        terms
    }

    /// Distinct terms of `text`, for "matched terms" explanations.
    pub fn term_set(&self, text: &str) -> HashSet<String> {
        self.normalize(text).into_iter().collect()
    }
}

/// Normalize with the default closed-class filter.
pub fn normalize(text: &str) -> Vec<String> {
    Normalizer::default().normalize(text)
}
