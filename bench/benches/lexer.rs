use criterion::{criterion_group, criterion_main, Criterion};
use horse::{language::Language, lexer, session::Session, token::Token};
use std::hint::black_box;

static INPUT: &str = include_str!("../shaders/lighting.horse");

fn criterion_benchmark(c: &mut Criterion) {
    let lang = Language::default();
    let mut session = Session::new(&lang);
    let file = session.file("lighting.horse");
    let mut tokens: Vec<Token> = Vec::with_capacity(4096);

    c.bench_function("lexer", |b| {
        b.iter(|| {
            tokens.clear();
            lexer::lex(&mut session, file, black_box(INPUT), &mut tokens);
            black_box(tokens.len());
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
