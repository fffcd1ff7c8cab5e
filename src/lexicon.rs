//! Ordered keyword lexicons and the matching rule shared by the classifier,
//! the ranker and the aggregator.
//!
//! A lexicon is an ordered list of lower-case terms. Matching walks the list
//! in order and the first term found in the text wins, so list order is part
//! of the contract: reordering a lexicon can change which reason or keyword a
//! verdict reports.
//!
//! A term matches when it is a substring of the lower-cased text. Multi-word
//! terms additionally match when each of their words is a prefix of the
//! corresponding consecutive word of the text, which lets `résultat annuel`
//! match `résultats annuels` without listing every inflection.

use serde::{Deserialize, Serialize};

/// Lower-cased text prepared once and matched against several lexicons.
#[derive(Debug, Clone)]
pub struct Haystack {
    lowered: String,
}

impl Haystack {
    pub fn new(text: &str) -> Self {
        Self {
            lowered: text.to_lowercase(),
        }
    }

    /// Build a haystack from a title and its surrounding context.
    pub fn from_parts(title: &str, context: &str) -> Self {
        Self::new(&format!("{title} {context}"))
    }

    pub fn as_str(&self) -> &str {
        &self.lowered
    }

    fn words(&self) -> Vec<&str> {
        split_words(&self.lowered)
    }
}

fn split_words(s: &str) -> Vec<&str> {
    s.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’' || c == '-'))
        .filter(|w| !w.is_empty())
        .collect()
}

/// An ordered list of lower-case terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Lexicon {
    terms: Vec<String>,
}

impl From<Vec<String>> for Lexicon {
    fn from(terms: Vec<String>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl From<Lexicon> for Vec<String> {
    fn from(lexicon: Lexicon) -> Self {
        lexicon.terms
    }
}

impl Lexicon {
    pub fn from_terms(terms: &[&str]) -> Self {
        Self::from(terms.iter().map(|t| t.to_string()).collect::<Vec<_>>())
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Return the first term, in list order, that matches the haystack.
    pub fn first_match(&self, haystack: &Haystack) -> Option<&str> {
        let words = haystack.words();
        self.terms
            .iter()
            .find(|term| term_matches(term, haystack.as_str(), &words))
            .map(String::as_str)
    }
}

fn term_matches(term: &str, lowered: &str, words: &[&str]) -> bool {
    if lowered.contains(term) {
        return true;
    }
    let term_words = split_words(term);
    if term_words.len() < 2 || words.len() < term_words.len() {
        return false;
    }
    words.windows(term_words.len()).any(|window| {
        window
            .iter()
            .zip(&term_words)
            .all(|(word, prefix)| word.starts_with(prefix))
    })
}

/// Every lexicon the pipeline uses, injected into the components that need them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicons {
    /// Terms that make an article irrelevant regardless of anything else.
    pub exclusions: Lexicon,
    /// Exchange-specific vocabulary: indices, listings, trading sessions.
    pub direct: Lexicon,
    /// Listed companies and their common aliases.
    pub entities: Lexicon,
    /// Major corporate actions.
    pub high: Lexicon,
    /// Financial performance vocabulary.
    pub medium: Lexicon,
}

impl Default for Lexicons {
    fn default() -> Self {
        Self {
            exclusions: Lexicon::from_terms(&[
                "wall street",
                "nasdaq",
                "dow jones",
                "s&p 500",
                "cac 40",
                "nikkei",
                "euro stoxx",
                "réserve fédérale",
                "federal reserve",
                "banque centrale européenne",
                "fmi",
                "banque mondiale",
                "bitcoin",
                "cryptomonnaie",
                "pétrole brent",
                "zone euro",
                "bourse de paris",
                "ministère de la santé",
                "ministère de l'éducation",
                "coupe du monde",
            ]),
            direct: Lexicon::from_terms(&[
                "bourse de casablanca",
                "casablanca stock exchange",
                "masi",
                "madex",
                "msi20",
                "ftse cse",
                "ammc",
                "introduction en bourse",
                "ipo",
                "cotation",
                "capitalisation boursière",
                "séance",
                "volume de transactions",
                "marché central",
                "marché des blocs",
                "sociétés cotées",
                "société cotée",
            ]),
            entities: Lexicon::from_terms(&[
                "attijariwafa",
                "banque populaire",
                "bcp",
                "bank of africa",
                "bmce",
                "cih bank",
                "crédit du maroc",
                "cdm",
                "bmci",
                "maroc telecom",
                "itissalat al-maghrib",
                "iam",
                "ocp",
                "lafargeholcim",
                "ciments du maroc",
                "cosumar",
                "lesieur",
                "label'vie",
                "marsa maroc",
                "taqa morocco",
                "managem",
                "addoha",
                "alliances",
                "résidences dar saada",
                "tgcc",
                "akdital",
                "wafa assurance",
                "saham",
                "atlantasanad",
                "hps",
                "disway",
                "m2m group",
                "totalenergies marketing maroc",
                "afriquia gaz",
                "sonasid",
                "jet contractors",
                "mutandis",
                "dari couspate",
                "aradei capital",
                "immorente",
                "cmgp",
                "ctm",
                "sothema",
                "promopharm",
                "auto hall",
                "sanlam maroc",
                "eqdom",
                "salafin",
                "maghreb oxygène",
                "colorado",
            ]),
            high: Lexicon::from_terms(&[
                "introduction en bourse",
                "ipo",
                "résultat annuel",
                "fusion",
                "acquisition",
                "rachat",
                "offre publique",
                "opa",
                "augmentation de capital",
                "levée de fonds",
                "emprunt obligataire",
                "programme de rachat",
                "suspension de cotation",
                "suspendu",
                "radiation",
                "masi record",
                "masi historique",
                "masi chute",
                "masi plonge",
                "masi s'envole",
            ]),
            medium: Lexicon::from_terms(&[
                "résultat",
                "chiffre d'affaires",
                "revenu",
                "bénéfice",
                "profit",
                "dividende",
                "stratégie",
                "partenariat",
                "investissement",
                "croissance",
                "perspectives",
            ]),
        }
    }
}
