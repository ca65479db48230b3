use criterion::{criterion_group, criterion_main, Criterion};
use horse::{language::Language, lexer, parser, session::Session};
use std::hint::black_box;

static INPUT: &str = include_str!("../shaders/lighting.horse");

fn criterion_benchmark(c: &mut Criterion) {
    let lang = Language::default();
    let mut session = Session::new(&lang);
    let file = session.file("lighting.horse");
    let tokens = lexer::lex_in_new(&mut session, file, INPUT);

    c.bench_function("parser", |b| {
        b.iter(|| {
            session.diagnostics.clear();
            let ast = parser::parse(&mut session, black_box(&tokens));
            _ = black_box(ast);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
