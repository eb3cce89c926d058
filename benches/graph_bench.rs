use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graphark::archive;
use graphark::{ArchiveResult, Decode, Decoder, Encode, Encoder, GraphType, Registry, TypeInfo};
use std::rc::Rc;

struct Item {
    id:      u64,
    name:    String,
    weights: Vec<f64>,
}

impl GraphType for Item {
    const TYPE_NAME: &'static str = "bench::Item";
}

impl Encode for Item {
    fn encode(&self, e: &mut Encoder<'_>) -> ArchiveResult<()> {
        e.encode("id", &self.id)?;
        e.encode("name", &self.name)?;
        e.encode("weights", &self.weights)
    }
    fn type_info(&self) -> Option<TypeInfo> { Some(TypeInfo::of::<Self>()) }
}

impl Decode for Item {
    fn decode(d: &mut Decoder<'_>) -> ArchiveResult<Self> {
        Ok(Item { id: d.decode("id")?, name: d.decode("name")?, weights: d.decode("weights")? })
    }
    fn persisted_type() -> Option<TypeInfo> { Some(TypeInfo::of::<Self>()) }
}

/// 1000 slots over 100 distinct items: every item is referenced ten times.
fn shared_graph() -> Vec<Rc<Item>> {
    let items: Vec<Rc<Item>> = (0..100)
        .map(|id| Rc::new(Item { id, name: format!("item-{id}"), weights: vec![id as f64; 16] }))
        .collect();
    (0..1000).map(|i| items[(i * 7) % items.len()].clone()).collect()
}

fn bench_encode(c: &mut Criterion) {
    let graph = shared_graph();
    c.bench_function("encode_shared_1000", |b| b.iter(|| archive::encode(black_box(&graph), 0).unwrap()));

    let flat: Vec<u64> = (0..100_000).collect();
    c.bench_function("encode_packed_100k_u64", |b| b.iter(|| archive::encode(black_box(&flat), 0).unwrap()));
}

fn bench_decode(c: &mut Criterion) {
    let bytes = archive::encode(&shared_graph(), 0).unwrap();
    let mut registry = Registry::new();
    registry.register::<Item>();

    c.bench_function("decode_shared_1000", |b| {
        b.iter(|| archive::decode::<Vec<Rc<Item>>>(black_box(&bytes), &registry).unwrap())
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
