use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nerda_core::{Dataset, TagEncoder, extract_entities};

fn sample_dataset() -> Dataset {
    let sentence = ["Jens", "Peter", "Hansen", "kommer", "fra", "Aarhus", "."];
    let labels = ["B-PER", "I-PER", "I-PER", "O", "O", "B-LOC", "O"];

    let sentences = (0..1000)
        .map(|_| sentence.iter().map(|s| s.to_string()).collect())
        .collect();
    let tags = (0..1000)
        .map(|_| labels.iter().map(|s| s.to_string()).collect())
        .collect();

    Dataset::new(sentences, tags).unwrap()
}

fn bench_tag_encoder(c: &mut Criterion) {
    let dataset = sample_dataset();

    c.bench_function("tag_encoder_fit_1000", |b| {
        b.iter(|| TagEncoder::fit_tags(black_box(dataset.tags())));
    });

    let encoder = TagEncoder::fit_tags(dataset.tags());
    c.bench_function("tag_encoder_encode_1000", |b| {
        b.iter(|| {
            for labels in dataset.tags() {
                let _ = encoder.encode_all(black_box(labels)).unwrap();
            }
        });
    });

    let (tokens, tags) = dataset.iter().next().unwrap();
    c.bench_function("extract_entities_single", |b| {
        b.iter(|| extract_entities(black_box(tokens), black_box(tags)));
    });
}

criterion_group!(benches, bench_tag_encoder);
criterion_main!(benches);
