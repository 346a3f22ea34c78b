//! Write and read throughput of archive directories.
//!
//! # Benchmarks
//!
//! - `write_1000_documents`: streams a synthetic tagged corpus through the writer
//! - `iterate_tokens`: walks every token label of every document
//! - `contained_tokens`: resolves tokens per sentence through the windowed span query
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench archive_benchmark
//! ```

use std::hint::black_box;
use std::path::{Path, PathBuf};

use arriba_core::{
    Archive, ArchiveWriter, DocumentInput, Selection, TagInput, TaggerInput, WriterOptions,
};
use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::json;

const WORDS: [&str; 8] = ["the", "quick", "brown", "fox", "jumps", "over", "lazy", "dogs"];

fn document(index: usize) -> DocumentInput {
    let mut text = String::new();
    let mut tokens = Vec::new();
    let mut sentences = Vec::new();
    let mut sentence_start = 0;
    for position in 0..120 {
        let word = WORDS[(index + position * 7) % WORDS.len()];
        let start = text.chars().count();
        text.push_str(word);
        tokens.push(TagInput::span(start, start + word.len()).label(word));
        if position % 12 == 11 {
            text.push('.');
            sentences.push(TagInput::span(sentence_start, start + word.len() + 1));
            text.push(' ');
            sentence_start = start + word.len() + 2;
        } else {
            text.push(' ');
        }
    }
    DocumentInput::new(text).tagger(
        TaggerInput::new(json!({"lib": "bench", "version": 1}))
            .tag("token", tokens)
            .tag("sentence", sentences),
    )
}

fn write_corpus(path: &Path, size: usize) {
    let options = WriterOptions::builder().overwrite(true).build();
    let mut writer = ArchiveWriter::create(path, options).expect("writer");
    for index in 0..size {
        writer.add_document(&document(index)).expect("add");
    }
    writer.finalize().expect("finalize");
}

fn corpus(size: usize) -> PathBuf {
    let path = std::env::temp_dir().join(format!("arriba_bench_{size}"));
    write_corpus(&path, size);
    path
}

fn bench_write(c: &mut Criterion) {
    let path = std::env::temp_dir().join("arriba_bench_write");
    let inputs: Vec<DocumentInput> = (0..1000).map(document).collect();
    c.bench_function("write_1000_documents", |b| {
        b.iter(|| {
            let options = WriterOptions::builder().overwrite(true).build();
            let mut writer = ArchiveWriter::create(&path, options).expect("writer");
            for input in &inputs {
                writer.add_document(input).expect("add");
            }
            black_box(writer.finalize().expect("finalize"));
        });
    });
}

fn bench_iterate(c: &mut Criterion) {
    let path = corpus(1000);
    let archive = Archive::open(&path).expect("open");
    c.bench_function("iterate_tokens", |b| {
        b.iter(|| {
            let mut labels = 0usize;
            for doc in archive.iter(&Selection::Auto).expect("iter") {
                let doc = doc.expect("document");
                for token in doc.spans("token").expect("tokens") {
                    labels += token.label().as_str().map_or(0, str::len);
                }
            }
            black_box(labels)
        });
    });

    c.bench_function("contained_tokens", |b| {
        b.iter(|| {
            let mut tokens = 0usize;
            for doc in archive.iter(&Selection::Auto).expect("iter") {
                let doc = doc.expect("document");
                for sentence in doc.spans("sentence").expect("sentences") {
                    let inner = sentence.get("tokens").expect("tokens");
                    tokens += inner.as_spans().map_or(0, |spans| spans.len());
                }
            }
            black_box(tokens)
        });
    });
}

criterion_group!(benches, bench_write, bench_iterate);
criterion_main!(benches);
