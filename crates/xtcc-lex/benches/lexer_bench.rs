//! Lexer benchmarks.
//!
//! Run with: `cargo bench --package xtcc-lex`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use xtcc_lex::{Lexer, Token};

fn lexer_token_count(source: &str) -> u32 {
    let mut lexer = Lexer::new(source);
    while lexer.next_token().expect("lex error") != Token::Eof {}
    lexer.token_count()
}

fn bench_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");

    let source = r#"
        enum { N = 16 };
        int table[N];

        int fill(int base) {
            int i;
            i = 0;
            while (i < N) {
                table[i] = base + i * 2; // dense operator mix
                i = i + 1;
            }
            return table[N - 1];
        }

        int main() {
            char *msg;
            msg = "fill\n";
            return fill(0x10) % 0755;
        }
    "#;
    group.throughput(Throughput::Bytes(source.len() as u64));

    group.bench_function("statement", |b| {
        b.iter(|| lexer_token_count(black_box("g[0] = g[1] + 7;")))
    });

    group.bench_function("small_program", |b| {
        b.iter(|| lexer_token_count(black_box(source)))
    });

    group.finish();
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
