//! Latency benchmarks for the detection path
//!
//! Decode and classify run once per pending transaction, ahead of mining, so
//! they should stay in the low microseconds.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{address, Address, Bytes, TxHash};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use riskwatch_mempool::config::ThresholdConfig;
use riskwatch_mempool::decoder::{decode, decode_transaction, PendingTransaction};
use riskwatch_mempool::ledger::RawTransaction;
use riskwatch_mempool::signatures::SignatureTable;
use riskwatch_mempool::{classify, Alert};

const ROUTER: Address = address!("10ED43C718714eb63d5aA57B78B54704E256024E");

fn thresholds() -> ThresholdConfig {
    ThresholdConfig::new(
        ROUTER,
        SignatureTable::pancake_v2(),
        parse_ether("10").unwrap(),
        parse_ether("1").unwrap(),
    )
    .unwrap()
}

fn removal_tx() -> PendingTransaction {
    let mut input = vec![0xaf, 0x29, 0x79, 0xeb];
    input.extend_from_slice(&[0u8; 192]);
    PendingTransaction {
        hash: TxHash::repeat_byte(0x42),
        from: Address::repeat_byte(0x11),
        to: Some(ROUTER),
        value: parse_ether("2").unwrap(),
        input: Bytes::from(input),
        gas_price: 5_000_000_000,
    }
}

/// Benchmark selector lookup
fn bench_decode(c: &mut Criterion) {
    let table = SignatureTable::pancake_v2();
    let tx = removal_tx();

    c.bench_function("decode_calldata", |b| b.iter(|| black_box(decode(black_box(&tx.input), &table))));
}

/// Benchmark raw lookup fields into a PendingTransaction
fn bench_decode_transaction(c: &mut Criterion) {
    let raw = RawTransaction {
        hash: "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef".to_string(),
        from: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
        to: Some("0x10ed43c718714eb63d5aa57b78b54704e256024e".to_string()),
        value: "0x1bc16d674ec80000".to_string(),
        input: format!("0xaf2979eb{}", "00".repeat(192)),
        gas_price: Some("0x12a05f200".to_string()),
        max_fee_per_gas: None,
    };

    c.bench_function("decode_transaction", |b| b.iter(|| black_box(decode_transaction(black_box(&raw)))));
}

fn bench_classify(c: &mut Criterion) {
    let cfg = thresholds();
    let tx = removal_tx();
    let decoded = decode(&tx.input, &cfg.signatures);

    c.bench_function("classify", |b| b.iter(|| black_box(classify(black_box(&tx), &decoded, &cfg))));
}

/// Benchmark decode → classify → alert JSON
fn bench_flagged_path(c: &mut Criterion) {
    let cfg = thresholds();
    let tx = removal_tx();

    c.bench_function("flagged_to_json", |b| {
        b.iter(|| {
            let decoded = decode(&tx.input, &cfg.signatures);
            let verdict = classify(&tx, &decoded, &cfg);
            let alert = Alert::from_verdict(&tx, &decoded, &verdict).unwrap();
            black_box(alert.to_message().to_json().unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_decode,
    bench_decode_transaction,
    bench_classify,
    bench_flagged_path
);

criterion_main!(benches);
