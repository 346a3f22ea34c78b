//! Label arities and the values they produce.
//!
//! A tag is read through one [`LabelArity`], chosen when the selection is resolved. The
//! arity decides both the shape of a present value and the empty sentinel returned for a
//! span the tag does not cover.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ArribaError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelArity {
    /// One string; several labels are joined with `|`, no label is `""`.
    #[default]
    Str,
    /// Every label value as a string.
    Strs,
    /// The first label with its score and producer, or `None`.
    Label,
    /// Every label with its score and producer.
    Labels,
}

impl LabelArity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Strs => "strs",
            Self::Label => "label",
            Self::Labels => "labels",
        }
    }

    /// Value returned for a span (or document) the tag does not label.
    #[must_use]
    pub fn empty<'a>(self) -> LabelValue<'a> {
        match self {
            Self::Str => LabelValue::Str(Cow::Borrowed("")),
            Self::Strs => LabelValue::Strs(Vec::new()),
            Self::Label => LabelValue::Label(None),
            Self::Labels => LabelValue::Labels(Vec::new()),
        }
    }

    pub fn build<'a, I>(self, labels: I) -> LabelValue<'a>
    where
        I: IntoIterator<Item = Label<'a>>,
    {
        let mut labels = labels.into_iter();
        match self {
            Self::Str => {
                let Some(first) = labels.next() else {
                    return LabelValue::Str(Cow::Borrowed(""));
                };
                match labels.next() {
                    None => LabelValue::Str(Cow::Borrowed(first.value)),
                    Some(second) => {
                        let mut joined = String::from(first.value);
                        for label in std::iter::once(second).chain(labels) {
                            joined.push('|');
                            joined.push_str(label.value);
                        }
                        LabelValue::Str(Cow::Owned(joined))
                    }
                }
            }
            Self::Strs => LabelValue::Strs(labels.map(|label| label.value).collect()),
            Self::Label => LabelValue::Label(labels.next()),
            Self::Labels => LabelValue::Labels(labels.collect()),
        }
    }
}

impl FromStr for LabelArity {
    type Err = ArribaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "str" => Ok(Self::Str),
            "strs" => Ok(Self::Strs),
            "label" => Ok(Self::Label),
            "labels" => Ok(Self::Labels),
            other => Err(ArribaError::InvalidTagSpec {
                spec: format!("unknown label type '{other}'"),
            }),
        }
    }
}

impl fmt::Display for LabelArity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One label of one span under one code. `value` borrows from the archive's value
/// dictionary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label<'a> {
    pub value: &'a str,
    pub score: Option<f32>,
    /// Index of the producing tagger in the archive header.
    pub tagger: usize,
}

/// Labels shaped by a [`LabelArity`].
#[derive(Debug, Clone, PartialEq)]
pub enum LabelValue<'a> {
    Str(Cow<'a, str>),
    Strs(Vec<&'a str>),
    Label(Option<Label<'a>>),
    Labels(Vec<Label<'a>>),
}

impl<'a> LabelValue<'a> {
    /// True for the arity's empty sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(value) => value.is_empty(),
            Self::Strs(values) => values.is_empty(),
            Self::Label(label) => label.is_none(),
            Self::Labels(labels) => labels.is_empty(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_ref()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_strs(&self) -> Option<&[&'a str]> {
        match self {
            Self::Strs(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_label(&self) -> Option<&Label<'a>> {
        match self {
            Self::Label(label) => label.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_labels(&self) -> Option<&[Label<'a>]> {
        match self {
            Self::Labels(labels) => Some(labels.as_slice()),
            _ => None,
        }
    }

    /// Plain label values regardless of arity.
    ///
    /// A `Str` is returned whole: its `|` separators cannot be told apart from a `|` inside
    /// a stored value. Read through `strs` to get the values one by one.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Str(value) if value.is_empty() => Vec::new(),
            Self::Str(value) => vec![&**value],
            Self::Strs(values) => values.clone(),
            Self::Label(label) => label.iter().map(|label| label.value).collect(),
            Self::Labels(labels) => labels.iter().map(|label| label.value).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<Label<'static>> {
        vec![
            Label {
                value: "NOUN",
                score: Some(0.75),
                tagger: 0,
            },
            Label {
                value: "VERB",
                score: None,
                tagger: 0,
            },
        ]
    }

    #[test]
    fn str_joins_multiple_values() {
        assert_eq!(LabelArity::Str.build(labels()).as_str(), Some("NOUN|VERB"));
        assert_eq!(
            LabelArity::Str.build(labels().into_iter().take(1)).as_str(),
            Some("NOUN")
        );
        assert_eq!(LabelArity::Str.build(Vec::new()).as_str(), Some(""));
    }

    #[test]
    fn every_arity_has_an_empty_sentinel() {
        for arity in [
            LabelArity::Str,
            LabelArity::Strs,
            LabelArity::Label,
            LabelArity::Labels,
        ] {
            let empty = arity.empty();
            assert!(empty.is_empty(), "{arity}");
            assert_eq!(arity.build(Vec::new()), empty, "{arity}");
            assert!(empty.values().is_empty());
        }
    }

    #[test]
    fn structured_arities_keep_scores() {
        let one = LabelArity::Label.build(labels());
        assert_eq!(one.as_label().map(|l| l.score), Some(Some(0.75)));

        let all = LabelArity::Labels.build(labels());
        let all = all.as_labels().expect("labels");
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].score, None);

        let strs = LabelArity::Strs.build(labels());
        assert_eq!(strs.as_strs(), Some(&["NOUN", "VERB"][..]));
    }

    #[test]
    fn values_keep_separators_inside_a_label() {
        let piped = || {
            vec![
                Label {
                    value: "a|b",
                    score: None,
                    tagger: 0,
                },
                Label {
                    value: "c",
                    score: None,
                    tagger: 0,
                },
            ]
        };
        assert_eq!(LabelArity::Strs.build(piped()).values(), vec!["a|b", "c"]);
        assert_eq!(LabelArity::Labels.build(piped()).values(), vec!["a|b", "c"]);
        assert_eq!(LabelArity::Str.build(piped()).values(), vec!["a|b|c"]);
        assert_eq!(
            LabelArity::Str.build(piped().into_iter().take(1)).values(),
            vec!["a|b"]
        );
    }

    #[test]
    fn parses_type_names() {
        assert_eq!("labels".parse::<LabelArity>().expect("arity"), LabelArity::Labels);
        assert!("int".parse::<LabelArity>().is_err());
    }
}
