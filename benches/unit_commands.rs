//! Benchmarks for per-unit command preparation
//!
//! Covers identifier derivation from raw filenames and rendering of configured tool
//! commands, both of which run once per unit per stage.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mstseg::config::ToolsConfig;
use mstseg_common::UnitId;
use mstseg_tools::TemplateContext;
use std::path::Path;

const FILENAMES: &[&str] = &[
    "20180605_RR215.iso",
    "2019-01-02_scan_extra_AB-12.iso",
    "ses!1_a_b_c_sub(9).iso",
    "20200101_very_long_description_of_the_acquisition_protocol_XY987.iso",
];

fn bench_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_unit");

    for name in FILENAMES {
        group.throughput(Throughput::Bytes(name.len() as u64));
        group.bench_with_input(BenchmarkId::new("from_filename", name), name, |b, name| {
            b.iter(|| UnitId::from_filename(black_box(name)).map(|u| u.to_bids()));
        });
    }

    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_command");
    let tools = ToolsConfig::default();
    let unit = UnitId::from_filename("20180605_RR215.iso")
        .map(|u| u.to_bids())
        .unwrap_or_else(|e| panic!("{e}"));

    let ctx = TemplateContext::new()
        .with_unit(&unit)
        .with_path("config", Path::new("/tmp/mstseg-abc/_tmp_sub-RR215_ses-20180605_config.json"))
        .with_path("raw_dir", Path::new("/home/data/sourcedata"))
        .with_path("bids_dir", Path::new("/home/data/bids_input"))
        .with_path("input", Path::new("/home/data/bids_input/sub-RR215/ses-20180605/anat/sub-RR215_ses-20180605_T1w.nii.gz"))
        .with_var("modality", "t1");

    for (name, spec) in [
        ("convert", &tools.convert),
        ("preprocess", &tools.preprocess),
        ("tissue_segmentation", &tools.tissue_segmentation),
    ] {
        group.bench_with_input(BenchmarkId::new("tool", name), spec, |b, spec| {
            b.iter(|| spec.render(black_box(&ctx)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_derive, bench_render);
criterion_main!(benches);
