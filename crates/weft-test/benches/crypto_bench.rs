//! Benchmarks for signing, verification and credential proofs

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use weft_core::Assertion;
use weft_crypto::{issue_credential, verify, verify_credential, Keypair};

fn bench_sign(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let payload = vec![0xA5u8; 256];
    c.bench_function("sign_256b", |b| b.iter(|| keypair.sign(black_box(&payload))));
}

fn bench_verify(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let payload = vec![0xA5u8; 256];
    let signature = keypair.sign(&payload);
    let public = keypair.public_bytes();
    c.bench_function("verify_256b", |b| {
        b.iter(|| verify(black_box(&public), black_box(&payload), black_box(&signature)))
    });
}

fn bench_credential_issue(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let identity = keypair.as_identity_key();
    c.bench_function("credential_issue", |b| {
        b.iter(|| {
            issue_credential(
                black_box(&keypair),
                identity,
                identity,
                Assertion::IdentityGenesis,
            )
        })
    });
}

fn bench_credential_verify(c: &mut Criterion) {
    let keypair = Keypair::generate();
    let identity = keypair.as_identity_key();
    let credential = issue_credential(&keypair, identity, identity, Assertion::IdentityGenesis);
    c.bench_function("credential_verify", |b| {
        b.iter(|| verify_credential(black_box(&credential)))
    });
}

criterion_group!(
    benches,
    bench_sign,
    bench_verify,
    bench_credential_issue,
    bench_credential_verify
);
criterion_main!(benches);
