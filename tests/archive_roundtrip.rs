//! End-to-end write/read tests over real archive directories.

use std::path::Path;

use arriba_core::types::{LabelArity, VectorInput};
use arriba_core::{
    Archive, ArchiveWriter, ArribaError, DocumentInput, IterOptions, OpenReadOptions, Selection,
    Slice, TagInput, TaggerInput, TaggerQuery, WriterOptions,
};
use serde_json::json;
use tempfile::TempDir;

fn write(path: &Path, documents: &[DocumentInput]) {
    let mut writer = ArchiveWriter::create(path, WriterOptions::default()).expect("writer");
    for document in documents {
        writer.add_document(document).expect("add document");
    }
    writer.finalize().expect("finalize");
}

fn ab_document() -> DocumentInput {
    DocumentInput::new("Ab.").tagger(
        TaggerInput::new(json!({"lib": "x"}))
            .tag(
                "token",
                vec![
                    TagInput::span(0, 1).label("Ab"),
                    TagInput::span(2, 3).label("."),
                ],
            )
            .tag("sentence", vec![]),
    )
}

#[test]
fn single_document_scenario() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ab");
    write(&path, &[ab_document()]);

    let archive = Archive::open(&path).expect("open");
    assert_eq!(archive.len(), 1);

    let documents: Vec<_> = archive
        .iter(&Selection::Auto)
        .expect("iter")
        .collect::<Result<_, _>>()
        .expect("documents");
    assert_eq!(documents.len(), 1);
    let doc = &documents[0];
    assert_eq!(doc.text(), "Ab.");
    assert_eq!(doc.tags(), vec!["token"]);

    let tokens: Vec<_> = doc.spans("token").expect("tokens").iter().collect();
    assert_eq!(tokens.len(), 2);
    assert_eq!((tokens[0].start(), tokens[0].end()), (0, 1));
    assert_eq!((tokens[1].start(), tokens[1].end()), (2, 3));
    assert_eq!(tokens[0].label().as_str(), Some("Ab"));
    assert_eq!(tokens[1].label().as_str(), Some("."));
    assert_eq!(tokens[0].text(), "A");

    let sentence = doc.get("sentence").expect("declared tag");
    assert_eq!(sentence.as_str(), Some(""));
    let sentence = tokens[1].get("sentence").expect("declared tag on span");
    assert!(sentence.is_empty());

    let plural = doc.get("tokens").expect("plural");
    assert_eq!(plural.as_spans().expect("span list").len(), 2);
}

#[test]
fn undeclared_tag_is_unknown() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ab");
    let document = DocumentInput::new("Ab.").tagger(TaggerInput::new(json!({"lib": "x"})).tag(
        "token",
        vec![
            TagInput::span(0, 1).label("Ab"),
            TagInput::span(2, 3).label("."),
        ],
    ));
    write(&path, &[document]);

    let archive = Archive::open(&path).expect("open");
    let registry = archive.select(&Selection::Auto).expect("select");
    let doc = archive.document(0, &registry).expect("document");
    let tokens: Vec<_> = doc.spans("token").expect("tokens").iter().collect();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[1].label().as_str(), Some("."));
    match doc.get("sentence") {
        Err(ArribaError::UnknownTag { name }) => assert_eq!(name, "sentence"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        tokens[0].get("sentence"),
        Err(ArribaError::UnknownTag { .. })
    ));
}

#[test]
fn taggers_without_tags_are_registered() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("tagless");
    let document = DocumentInput::new("Ab.")
        .tagger(TaggerInput::new(json!({"lib": "empty"})))
        .tagger(TaggerInput::new(json!({"lib": "x"})).tag("token", vec![TagInput::span(0, 1)]));
    write(&path, &[document]);

    let archive = Archive::open(&path).expect("open");
    let taggers = &archive.header().taggers;
    assert_eq!(taggers.len(), 2);
    assert!(taggers[0].codes.is_empty());
    assert_eq!(taggers[1].codes, vec![0]);
    assert_eq!(archive.taggers()[0].signature, json!({"lib": "empty"}));
    assert!(archive.taggers()[0].tags.is_empty());
    assert_eq!(archive.taggers()[1].tags, vec!["token"]);

    let registry = archive.select(&Selection::Auto).expect("select");
    assert_eq!(registry.names(), vec!["token"]);
}

#[test]
fn meta_json_and_header_describe_the_archive() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("ab");
    write(&path, &[ab_document().meta(json!({"source": "unit"}))]);

    let meta: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(path.join("meta.json")).expect("meta.json"),
    )
    .expect("json");
    assert_eq!(meta["type"], "archive");
    assert_eq!(meta["engine"], "arriba");
    assert_eq!(meta["version"], 1);

    let archive = Archive::open(&path).expect("open");
    assert_eq!(meta["guid"], archive.guid());
    assert_eq!(archive.taggers().len(), 1);
    assert_eq!(archive.taggers()[0].signature, json!({"lib": "x"}));
    assert_eq!(archive.taggers()[0].tags, vec!["sentence", "token"]);
    assert_eq!(archive.codes().len(), 2);

    let registry = archive.select(&Selection::Auto).expect("select");
    let doc = archive.document(0, &registry).expect("document");
    assert_eq!(doc.meta().expect("meta"), json!({"source": "unit"}));
}

#[test]
fn unicode_offsets_round_trip_as_characters() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("unicode");
    let text = "Ünïcødé wörds → ok";
    let words: Vec<(usize, usize)> = vec![(0, 7), (8, 13), (14, 15), (16, 18)];
    let document = DocumentInput::new(text).tagger(TaggerInput::new(json!("w")).tag(
        "word",
        words
            .iter()
            .map(|&(start, end)| TagInput::span(start, end).label("w"))
            .collect(),
    ));
    write(&path, &[document]);

    let archive = Archive::open(&path).expect("open");
    let doc = archive
        .iter(&Selection::Auto)
        .expect("iter")
        .next()
        .expect("one document")
        .expect("decodes");
    let chars: Vec<char> = text.chars().collect();
    for (span, &(start, end)) in doc.spans("word").expect("words").iter().zip(&words) {
        assert_eq!((span.start(), span.end()), (start, end));
        let expected: String = chars[start..end].iter().collect();
        assert_eq!(span.text(), expected);
    }
    assert_eq!(
        doc.spans("word").expect("words").get(1).expect("second").text(),
        "wörds"
    );
}

#[test]
fn parents_and_document_level_labels() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("deps");
    let document = DocumentInput::new("the cat sat").tagger(
        TaggerInput::new(json!({"lib": "dep"}))
            .tag(
                "dep",
                vec![
                    TagInput::span(8, 11).label("root"),
                    TagInput::span(0, 3).label("det").parent(2),
                    TagInput::span(4, 7).label("nsubj").parent(0),
                ],
            )
            .tag(
                "lang",
                vec![TagInput::document().scored("en", 0.98), TagInput::document().label("la")],
            ),
    );
    write(&path, &[document]);

    let archive = Archive::open(&path).expect("open");
    let selection = Selection::explicit(vec![
        TaggerQuery::pattern(json!({"lib": "dep"}))
            .tag("dep")
            .expect("spec")
            .tag("lang : labels")
            .expect("spec"),
    ]);
    let registry = archive.select(&selection).expect("select");
    let doc = archive.document(0, &registry).expect("document");

    let lang = doc.get("lang").expect("lang").into_value().expect("value");
    let labels = lang.as_labels().expect("labels");
    assert_eq!(labels.len(), 2);
    assert_eq!((labels[0].value, labels[0].score), ("en", Some(0.98)));
    assert_eq!((labels[1].value, labels[1].score), ("la", None));

    let deps: Vec<_> = doc.spans("dep").expect("deps").iter().collect();
    let texts: Vec<&str> = deps.iter().map(|span| span.text()).collect();
    assert_eq!(texts, vec!["the", "cat", "sat"]);
    let the = deps[0];
    let cat = the.parent().expect("the -> cat");
    assert_eq!(cat.text(), "cat");
    assert_eq!(cat.label().as_str(), Some("nsubj"));
    assert_eq!(cat.parent().expect("cat -> sat").text(), "sat");
    assert!(deps[2].parent().is_none());
}

#[test]
fn vectors_follow_entries() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("vectors");
    let mut tagger = TaggerInput::new(json!({"lib": "emb"})).tag(
        "token",
        vec![TagInput::span(3, 4).label("b"), TagInput::span(0, 1).label("a")],
    );
    tagger.vectors.insert(
        "token".to_string(),
        VectorInput::Rows(vec![vec![2.0, 2.5], vec![1.0, 1.5]]),
    );
    let tagger = tagger.vector_stream("token", "context", vec![vec![20.0], vec![10.0]]);
    write(&path, &[DocumentInput::new("a  b").tagger(tagger)]);

    let archive = Archive::open(&path).expect("open");
    let registry = archive.select(&Selection::Auto).expect("select");
    let doc = archive.document(0, &registry).expect("document");
    let tokens: Vec<_> = doc.spans("token").expect("tokens").iter().collect();
    assert_eq!(tokens[0].text(), "a");
    assert_eq!(tokens[0].vector("vector"), Some(vec![1.0, 1.5]));
    assert_eq!(tokens[1].vector("vector"), Some(vec![2.0, 2.5]));
    assert_eq!(tokens[1].vector("context"), Some(vec![20.0]));
    assert_eq!(tokens[0].vector("missing"), None);

    let store = archive.vectors().expect("vector store");
    assert_eq!(store.guid(), archive.guid());

    let skipped = Archive::open_with(
        &path,
        OpenReadOptions {
            load_vectors: false,
            ..OpenReadOptions::default()
        },
    )
    .expect("open without vectors");
    assert!(skipped.vectors().is_none());
}

#[test]
fn dictionaries_are_deduplicated() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("dedup");
    let signature = json!({"lib": "x", "version": 1});
    let documents: Vec<DocumentInput> = (0..2)
        .map(|_| {
            DocumentInput::new("a a").tagger(TaggerInput::new(signature.clone()).tag(
                "token",
                vec![TagInput::span(0, 1).label("a"), TagInput::span(2, 3).label("a")],
            ))
        })
        .collect();
    write(&path, &documents);

    let archive = Archive::open(&path).expect("open");
    assert_eq!(archive.header().taggers.len(), 1);
    assert_eq!(archive.codes().len(), 1);
    assert_eq!(archive.codes()[0].values, vec!["a"]);
}

#[test]
fn key_and_text_lookup() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("keys");
    let documents = vec![
        DocumentInput::new("first").external_key(json!({"id": 1})),
        DocumentInput::new("second").external_key(json!("two")),
        DocumentInput::new("first"),
    ];
    write(&path, &documents);

    let archive = Archive::open(&path).expect("open");
    assert_eq!(archive.find_by_key(&json!({"id": 1})).expect("key"), vec![0]);
    assert_eq!(archive.find_by_key(&json!("two")).expect("key"), vec![1]);
    assert!(archive.find_by_key(&json!("three")).expect("key").is_empty());
    assert_eq!(archive.find_by_text("first").expect("text"), vec![0, 2]);
    assert!(archive.find_by_text("third").expect("text").is_empty());
}

#[test]
fn slices_partition_the_documents() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("slices");
    let documents: Vec<_> = (0..7).map(|i| DocumentInput::new(format!("doc {i}"))).collect();
    write(&path, &documents);

    let archive = Archive::open(&path).expect("open");
    let mut seen = Vec::new();
    for index in 1..=3 {
        let slice = Slice::new(index, 3).expect("slice");
        let iter = archive
            .iter_with(&Selection::Auto, IterOptions::default().slice(slice))
            .expect("iter");
        let expected = (0..7).filter(|doc| slice.contains(*doc)).count();
        assert_eq!(iter.len(), expected);
        for doc in iter {
            let doc = doc.expect("document");
            assert!(slice.contains(doc.index()));
            seen.push(doc.index());
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..7).collect::<Vec<_>>());
}

#[test]
fn typed_label_access() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("typed");
    let document = DocumentInput::new("Paris").tagger(TaggerInput::new(json!("ner")).tag(
        "ent",
        vec![TagInput::span(0, 5).scored("LOC", 0.9).scored("GPE", 0.4)],
    ));
    write(&path, &[document]);
    let archive = Archive::open(&path).expect("open");

    for (spec, arity) in [
        ("ent", LabelArity::Str),
        ("ent:strs", LabelArity::Strs),
        ("ent : label", LabelArity::Label),
        ("ent as entity : labels", LabelArity::Labels),
    ] {
        let selection =
            Selection::explicit(vec![TaggerQuery::index(0).tag(spec).expect("spec")]);
        let registry = archive.select(&selection).expect("select");
        assert_eq!(registry.form(0).arity, arity);
        let doc = archive.document(0, &registry).expect("document");
        let name = registry.form(0).name.clone();
        let span = doc.spans(&name).expect("spans").first().expect("span");
        let label = span.label();
        match arity {
            LabelArity::Str => assert_eq!(label.as_str(), Some("LOC|GPE")),
            LabelArity::Strs => assert_eq!(label.as_strs(), Some(&["LOC", "GPE"][..])),
            LabelArity::Label => {
                let first = label.as_label().expect("label");
                assert_eq!((first.value, first.score), ("LOC", Some(0.9)));
            }
            LabelArity::Labels => {
                assert_eq!(name, "entity");
                assert_eq!(label.values(), vec!["LOC", "GPE"]);
            }
        }
    }
}
