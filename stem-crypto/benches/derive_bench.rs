//! Criterion benchmarks for Stem derivation: opcode, channel identifier, program addresses.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use solana_program::pubkey::Pubkey;
use stem_crypto::{channel_identifier, operation_opcode, ProgramAddresses};

fn bench_opcode(c: &mut Criterion) {
    let mut g = c.benchmark_group("opcode");
    g.throughput(Throughput::Elements(1));
    g.bench_function("operation_opcode", |b| {
        b.iter(|| black_box(operation_opcode(black_box("sendmessage"))));
    });
    g.finish();
}

fn bench_channel_identifier(c: &mut Criterion) {
    let a = Pubkey::new_from_array([1u8; 32]);
    let b = Pubkey::new_from_array([2u8; 32]);
    let mut g = c.benchmark_group("channel_identifier");
    g.throughput(Throughput::Elements(1));
    g.bench_function("channel_identifier", |bench| {
        bench.iter(|| black_box(channel_identifier(&a, &b)).unwrap());
    });
    g.finish();
}

fn bench_program_addresses(c: &mut Criterion) {
    let addresses = ProgramAddresses::default();
    let a = Pubkey::new_from_array([1u8; 32]);
    let b = Pubkey::new_from_array([2u8; 32]);
    let mut g = c.benchmark_group("program_address");
    g.throughput(Throughput::Elements(1));
    g.bench_function("descriptor", |bench| {
        bench.iter(|| black_box(addresses.descriptor(&a)).unwrap());
    });
    g.bench_function("channel", |bench| {
        bench.iter(|| black_box(addresses.channel(&a, &b)).unwrap());
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_opcode,
    bench_channel_identifier,
    bench_program_addresses
);
criterion_main!(benches);
