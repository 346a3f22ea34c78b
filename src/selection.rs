//! Binding human-facing tag names to concrete codes.
//!
//! A [`Selection`] is resolved once per iteration against the archive header into a
//! [`TagRegistry`]: the list of selected tag forms plus a name table that maps both the
//! singular and the plural name of every form to it.

use std::collections::HashMap;
use std::str::FromStr;

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ArribaError, Result};
use crate::types::{ArchiveHeader, LabelArity};

fn tag_spec_regex() -> std::result::Result<&'static Regex, &'static str> {
    static TAG_SPEC: OnceCell<std::result::Result<Regex, String>> = OnceCell::new();
    let regex = TAG_SPEC.get_or_init(|| {
        Regex::new(r"^\s*([-\w]+)(?:\s+as\s+([-\w]+))?\s*(?::\s*(\w+))?\s*$")
            .map_err(|err| err.to_string())
    });
    match regex {
        Ok(re) => Ok(re),
        Err(msg) => {
            tracing::error!(target = "arriba::selection", error = %msg, "tag spec regex init failed");
            Err(msg.as_str())
        }
    }
}

/// `name`, `name as alias`, `name : type` or `name as alias : type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    pub name: String,
    pub rename: Option<String>,
    pub arity: LabelArity,
}

impl TagSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rename: None,
            arity: LabelArity::default(),
        }
    }

    /// Name the tag is exposed under.
    #[must_use]
    pub fn external_name(&self) -> &str {
        self.rename.as_deref().unwrap_or(&self.name)
    }
}

impl FromStr for TagSpec {
    type Err = ArribaError;

    fn from_str(spec: &str) -> Result<Self> {
        let invalid = || ArribaError::InvalidTagSpec {
            spec: spec.to_string(),
        };
        let regex = tag_spec_regex().map_err(|_| invalid())?;
        let captures = regex.captures(spec).ok_or_else(invalid)?;
        let name = captures.get(1).ok_or_else(invalid)?.as_str().to_string();
        let rename = captures.get(2).map(|m| m.as_str().to_string());
        let arity = match captures.get(3) {
            Some(kind) => kind.as_str().parse::<LabelArity>().map_err(|_| invalid())?,
            None => LabelArity::default(),
        };
        Ok(Self {
            name,
            rename,
            arity,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaggerTarget {
    /// Every tagger whose signature matches the pattern.
    Pattern(Value),
    /// The tagger at this header index.
    Index(usize),
}

/// One entry of an explicit selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggerQuery {
    pub target: TaggerTarget,
    /// `None` selects every tag of the matched taggers as `str`.
    pub tags: Option<Vec<TagSpec>>,
}

impl TaggerQuery {
    #[must_use]
    pub fn pattern(pattern: Value) -> Self {
        Self {
            target: TaggerTarget::Pattern(pattern),
            tags: None,
        }
    }

    #[must_use]
    pub fn index(index: usize) -> Self {
        Self {
            target: TaggerTarget::Index(index),
            tags: None,
        }
    }

    /// Adds a tag spec such as `"pos as upos : strs"`.
    pub fn tag(mut self, spec: &str) -> Result<Self> {
        let spec: TagSpec = spec.parse()?;
        self.tags.get_or_insert_with(Vec::new).push(spec);
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Selection {
    /// Every tag of every tagger under its own name; a name shared by two taggers fails.
    #[default]
    Auto,
    /// Every tag of every tagger; shared names get the tagger index as a suffix.
    All,
    Explicit(Vec<TaggerQuery>),
}

impl Selection {
    #[must_use]
    pub fn explicit(queries: Vec<TaggerQuery>) -> Self {
        Self::Explicit(queries)
    }

    pub fn resolve(&self, header: &ArchiveHeader) -> Result<TagRegistry> {
        let mut forms = Vec::new();
        match self {
            Self::Auto => {
                for (tagger, meta) in header.taggers.iter().enumerate() {
                    for &code in &meta.codes {
                        let name = code_name(header, code)?;
                        forms.push(TagForm::new(name, name, tagger, code, LabelArity::Str));
                    }
                }
            }
            Self::All => {
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for code in &header.codes {
                    *counts.entry(code.name.as_str()).or_default() += 1;
                }
                for (tagger, meta) in header.taggers.iter().enumerate() {
                    for &code in &meta.codes {
                        let name = code_name(header, code)?;
                        let external = if counts.get(name).copied().unwrap_or(0) > 1 {
                            format!("{name}_{tagger}")
                        } else {
                            name.to_string()
                        };
                        forms.push(TagForm::new(&external, name, tagger, code, LabelArity::Str));
                    }
                }
            }
            Self::Explicit(queries) => {
                for query in queries {
                    for tagger in matching_taggers(header, &query.target)? {
                        select_tags(header, tagger, query.tags.as_deref(), &mut forms)?;
                    }
                }
            }
        }
        TagRegistry::new(forms)
    }
}

fn code_name(header: &ArchiveHeader, code: u32) -> Result<&str> {
    header
        .codes
        .get(code as usize)
        .map(|meta| meta.name.as_str())
        .ok_or_else(|| ArribaError::InvalidHeader {
            reason: format!("tagger references missing code {code}"),
        })
}

fn matching_taggers(header: &ArchiveHeader, target: &TaggerTarget) -> Result<Vec<usize>> {
    match target {
        TaggerTarget::Index(index) => {
            if *index < header.taggers.len() {
                Ok(vec![*index])
            } else {
                Err(ArribaError::UnknownTag {
                    name: format!("tagger #{index}"),
                })
            }
        }
        TaggerTarget::Pattern(pattern) => {
            let pattern = expand_dotted_keys(pattern);
            let mut matched = Vec::new();
            for (index, tagger) in header.taggers.iter().enumerate() {
                if match_pattern(&pattern, &tagger.signature_value()?) {
                    matched.push(index);
                }
            }
            Ok(matched)
        }
    }
}

fn select_tags(
    header: &ArchiveHeader,
    tagger: usize,
    specs: Option<&[TagSpec]>,
    forms: &mut Vec<TagForm>,
) -> Result<()> {
    let codes = &header.taggers[tagger].codes;
    match specs {
        None => {
            for &code in codes {
                let name = code_name(header, code)?;
                forms.push(TagForm::new(name, name, tagger, code, LabelArity::Str));
            }
        }
        Some(specs) => {
            for spec in specs {
                // Tags the tagger never produced are skipped.
                for &code in codes {
                    if code_name(header, code)? == spec.name {
                        forms.push(TagForm::new(
                            spec.external_name(),
                            &spec.name,
                            tagger,
                            code,
                            spec.arity,
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Matches a tagger signature against a pattern: every key of an object pattern must be
/// present (and non-null) in the signature with a matching value; anything else compares
/// by equality.
#[must_use]
pub fn match_pattern(pattern: &Value, data: &Value) -> bool {
    match pattern {
        Value::Object(expected) => {
            let Value::Object(actual) = data else {
                return false;
            };
            expected.iter().all(|(key, expected)| match actual.get(key) {
                Some(Value::Null) | None => false,
                Some(actual) => match_pattern(expected, actual),
            })
        }
        other => other == data,
    }
}

/// Rewrites `{"model.lang": "en"}` as `{"model": {"lang": "en"}}`, merging siblings.
#[must_use]
pub fn expand_dotted_keys(pattern: &Value) -> Value {
    let Value::Object(object) = pattern else {
        return pattern.clone();
    };
    let mut expanded = Map::new();
    for (key, value) in object {
        let path: Vec<&str> = key.split('.').collect();
        insert_path(&mut expanded, &path, expand_dotted_keys(value));
    }
    Value::Object(expanded)
}

fn insert_path(target: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [last] => match value {
            Value::Object(incoming) => {
                if let Some(Value::Object(existing)) = target.get_mut(*last) {
                    existing.extend(incoming);
                } else {
                    target.insert((*last).to_string(), Value::Object(incoming));
                }
            }
            value => {
                target.insert((*last).to_string(), value);
            }
        },
        [head, rest @ ..] => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(next) = slot {
                insert_path(next, rest, value);
            }
        }
    }
}

/// Plural name under which a tag's span list is exposed.
#[must_use]
pub fn pluralize(name: &str) -> String {
    if name.ends_with('s') {
        format!("{name}_tags")
    } else {
        format!("{name}s")
    }
}

/// One selected tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagForm {
    /// Name the tag is exposed under.
    pub name: String,
    /// Name the tagger gave the tag.
    pub internal: String,
    pub tagger: usize,
    pub code: u32,
    pub arity: LabelArity,
}

impl TagForm {
    fn new(name: &str, internal: &str, tagger: usize, code: u32, arity: LabelArity) -> Self {
        Self {
            name: name.to_string(),
            internal: internal.to_string(),
            tagger,
            code,
            arity,
        }
    }

    #[must_use]
    pub fn plural_name(&self) -> String {
        pluralize(&self.name)
    }
}

/// A name resolved against a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormRef {
    pub index: usize,
    pub plural: bool,
}

/// Resolved selection: selected forms and the name table covering both inflections.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    forms: Vec<TagForm>,
    names: HashMap<String, FormRef>,
}

impl TagRegistry {
    pub fn new(forms: Vec<TagForm>) -> Result<Self> {
        let mut names = HashMap::with_capacity(forms.len() * 2);
        for (index, form) in forms.iter().enumerate() {
            for (name, plural) in [(form.name.clone(), false), (form.plural_name(), true)] {
                if names.contains_key(&name) {
                    return Err(ArribaError::AmbiguousSelection { name });
                }
                names.insert(name, FormRef { index, plural });
            }
        }
        tracing::debug!(selection.forms = forms.len(), "resolved tag selection");
        Ok(Self { forms, names })
    }

    #[must_use]
    pub fn forms(&self) -> &[TagForm] {
        &self.forms
    }

    #[must_use]
    pub fn form(&self, index: usize) -> &TagForm {
        &self.forms[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Result<FormRef> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| ArribaError::UnknownTag {
                name: name.to_string(),
            })
    }

    /// Index of the form exposed as singular `name`.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names
            .get(name)
            .filter(|form| !form.plural)
            .map(|form| form.index)
    }

    /// Exposed singular names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.forms.iter().map(|form| form.name.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeMeta, TaggerMeta};
    use serde_json::json;

    fn header() -> ArchiveHeader {
        let tagger = |signature: Value, codes: Vec<u32>| TaggerMeta {
            signature: serde_json::to_string(&signature).expect("signature"),
            codes,
        };
        let code = |tagger: u32, name: &str| CodeMeta {
            tagger,
            name: name.to_string(),
            values: Vec::new(),
        };
        ArchiveHeader {
            taggers: vec![
                tagger(json!({"lib": "spacy", "model": {"lang": "en"}}), vec![0, 1]),
                tagger(json!({"lib": "stanza", "model": {"lang": "de"}}), vec![2, 3]),
            ],
            codes: vec![
                code(0, "token"),
                code(0, "pos"),
                code(1, "token"),
                code(1, "ent"),
            ],
            ..ArchiveHeader::default()
        }
    }

    #[test]
    fn parses_tag_specs() {
        let spec: TagSpec = "pos".parse().expect("plain");
        assert_eq!(spec, TagSpec::new("pos"));

        let spec: TagSpec = "pos as upos : strs".parse().expect("full");
        assert_eq!(spec.external_name(), "upos");
        assert_eq!(spec.arity, LabelArity::Strs);

        let spec: TagSpec = "ents:labels".parse().expect("typed");
        assert_eq!(spec.name, "ents");
        assert_eq!(spec.arity, LabelArity::Labels);

        for bad in ["", "pos as", "pos : int", "a b"] {
            assert!(bad.parse::<TagSpec>().is_err(), "'{bad}'");
        }
    }

    #[test]
    fn auto_fails_on_shared_names() {
        match Selection::Auto.resolve(&header()) {
            Err(ArribaError::AmbiguousSelection { name }) => assert_eq!(name, "token"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn all_suffixes_shared_names() {
        let registry = Selection::All.resolve(&header()).expect("all");
        assert_eq!(registry.names(), vec!["ent", "pos", "token_0", "token_1"]);
        let form = registry.form(registry.position("token_1").expect("token_1"));
        assert_eq!((form.tagger, form.code), (1, 2));
        assert!(registry.lookup("token_1s").expect("plural").plural);
    }

    #[test]
    fn explicit_patterns_pick_taggers() {
        let selection = Selection::explicit(vec![
            TaggerQuery::pattern(json!({"model.lang": "de"}))
                .tag("token as tok : labels")
                .expect("spec")
                .tag("missing")
                .expect("spec"),
            TaggerQuery::index(0).tag("pos").expect("spec"),
        ]);
        let registry = selection.resolve(&header()).expect("explicit");
        assert_eq!(registry.names(), vec!["pos", "tok"]);
        let tok = registry.form(registry.position("tok").expect("tok"));
        assert_eq!(tok.code, 2);
        assert_eq!(tok.arity, LabelArity::Labels);

        match registry.lookup("lemma") {
            Err(ArribaError::UnknownTag { name }) => assert_eq!(name, "lemma"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn inflection_clash_is_ambiguous() {
        let forms = vec![
            TagForm::new("token", "token", 0, 0, LabelArity::Str),
            TagForm::new("tokens", "tokens", 0, 1, LabelArity::Str),
        ];
        assert!(matches!(
            TagRegistry::new(forms),
            Err(ArribaError::AmbiguousSelection { .. })
        ));
    }

    #[test]
    fn pluralizes() {
        assert_eq!(pluralize("token"), "tokens");
        assert_eq!(pluralize("pos"), "pos_tags");
    }

    #[test]
    fn patterns_match_recursively() {
        let signature = json!({"lib": "spacy", "model": {"lang": "en", "size": "sm"}, "gpu": null});
        assert!(match_pattern(&json!({"lib": "spacy"}), &signature));
        assert!(match_pattern(
            &expand_dotted_keys(&json!({"model.lang": "en", "model.size": "sm"})),
            &signature
        ));
        assert!(!match_pattern(&json!({"model": {"lang": "de"}}), &signature));
        assert!(!match_pattern(&json!({"gpu": null}), &signature));
        assert!(!match_pattern(&json!({"lib": {"name": "spacy"}}), &signature));
    }
}
