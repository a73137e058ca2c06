//! End-to-end integration tests for prodforge.
//!
//! These tests exercise the full pipeline from a descriptor on disk to the
//! materialised configuration text, including reverse resolution, job maps
//! and parallel sweeps.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use prodforge::{SweepOptions, missing_outputs, usage_report};
use prodforge_config::{JobMap, ToolConfig, index_token, load_definition, parse_index_token};
use prodforge_core::{
    Error, InputLocator, Location, Materializer, Protocol, materialize, resolve, resolve_range,
    resolve_target,
};

// ── Fixtures ─────────────────────────────────────────────────────────────

const MIX_DESCRIPTOR: &str = r#"
owner = "mu2e"
desc = "CeEndpointMix"
dsconf = "MDC2025ac"
run = 1202
njobs = 40
events_per_job = 500

[template]
include = "Production/JobConfig/mixing/Mix.fcl"
overrides = [
    { key = "services.GeometryService.inputFile", value = '"Offline/Mu2eG4/geom/geom_run1_a.txt"' },
]

[[aux]]
role = "physics.filters.MuBeamFlashMixer.fileNames"
per_job = 2
catalog = "mubeam.txt"

[[aux]]
role = "physics.filters.EleBeamFlashMixer.fileNames"
files = ["/pnfs/mu2e/tape/ele0.art", "/pnfs/mu2e/tape/ele1.art", "/pnfs/mu2e/tape/ele2.art"]

[[outputs]]
key = "outputs.PrimaryOutput.fileName"
pattern = "dig.{owner}.{desc}.{dsconf}.{sequencer}.art"
location = "disk"
"#;

const MERGE_DESCRIPTOR: &str = r#"
owner = "mu2e"
desc = "Merged"
dsconf = "v1"
run = 1430
selection = "sequential"

[template]
include = "Production/JobConfig/common/artcat.fcl"

[primary]
catalog = "inputs.txt"
merge_factor = 3

[[outputs]]
key = "outputs.out.fileName"
pattern = "sim.mu2e.Merged.v1.sequencer.art"
"#;

/// Write a descriptor and its catalogs into `dir`.
fn write_mix(dir: &Path) -> PathBuf {
    let catalog: String = (0..10)
        .map(|i| format!("/pnfs/mu2e/tape/mubeam{i:02}.art\n"))
        .collect();
    std::fs::write(dir.join("mubeam.txt"), format!("# MuBeam catalog\n\n{catalog}")).unwrap();
    let path = dir.join("mix.toml");
    std::fs::write(&path, MIX_DESCRIPTOR).unwrap();
    path
}

fn write_merge(dir: &Path) -> PathBuf {
    let inputs: String = (0..8).map(|i| format!("sim.mu2e.In.v1.001000_{i:08}.art\n")).collect();
    std::fs::write(dir.join("inputs.txt"), inputs).unwrap();
    let path = dir.join("merge.toml");
    std::fs::write(&path, MERGE_DESCRIPTOR).unwrap();
    path
}

// ── Descriptor → parameters ──────────────────────────────────────────────

#[test]
fn descriptor_loads_and_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();

    assert_eq!(def.name, "mix");
    assert_eq!(def.njobs, 40);
    assert_eq!(def.aux.len(), 2);
    assert_eq!(def.aux["physics.filters.MuBeamFlashMixer.fileNames"].len(), 10);

    let params = resolve(&def, 7).unwrap();
    assert_eq!(params.sequencer.to_string(), "001202_00000007");
    assert_eq!(
        params.output("outputs.PrimaryOutput.fileName"),
        Some("dig.mu2e.CeEndpointMix.MDC2025ac.001202_00000007.art")
    );
    assert_eq!(params.aux_inputs["physics.filters.MuBeamFlashMixer.fileNames"].len(), 2);
    assert_eq!(params.aux_inputs["physics.filters.EleBeamFlashMixer.fileNames"].len(), 1);
    assert_eq!(params.events, 500);
}

#[test]
fn resolution_is_deterministic_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_mix(dir.path());
    let a = load_definition(&path).unwrap();
    let b = load_definition(&path).unwrap();

    let ra = resolve_range(&a, 0..a.njobs).unwrap();
    let rb = resolve_range(&b, 0..b.njobs).unwrap();
    assert_eq!(ra, rb);

    let seeds: HashSet<u32> = ra.iter().map(|p| p.seed).collect();
    assert_eq!(seeds.len(), ra.len(), "every job gets its own seed");
}

#[test]
fn index_out_of_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();
    let err = resolve(&def, 40).unwrap_err();
    assert!(matches!(err, Error::IndexRange { index: 40, njobs: 40 }));
}

#[test]
fn invalid_descriptor_reports_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
run = 1
events_per_job = 0

[template]
include = "x.fcl"

[[aux]]
role = "physics.filters.gen.fileNames"
"#,
    )
    .unwrap();

    let err = load_definition(&path).unwrap_err().to_string();
    assert!(err.contains("njobs"), "{err}");
    assert!(err.contains("events_per_job"), "{err}");
    assert!(err.contains("no catalog supplied"), "{err}");
}

// ── Reverse resolution ───────────────────────────────────────────────────

#[test]
fn every_output_resolves_back_to_its_job() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();

    for params in resolve_range(&def, 0..def.njobs).unwrap() {
        let name = params.output("outputs.PrimaryOutput.fileName").unwrap();
        let back = resolve_target(&def, name).unwrap();
        assert_eq!(back, params);
    }
}

#[test]
fn foreign_and_garbage_targets_are_classified() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();

    let foreign = resolve_target(&def, "dig.mu2e.Other.MDC2025ac.001202_00000001.art").unwrap_err();
    assert_eq!(foreign.kind(), "target_mismatch");

    let garbage = resolve_target(&def, "not-a-data-file").unwrap_err();
    assert_eq!(garbage.kind(), "target_parse");

    let early = resolve_target(&def, "dig.mu2e.CeEndpointMix.MDC2025ac.001201_00000001.art")
        .unwrap_err();
    assert_eq!(early.kind(), "target_mismatch");
}

// ── Materialisation ──────────────────────────────────────────────────────

#[test]
fn materialized_text_keeps_template_then_appends() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();
    let params = resolve(&def, 3).unwrap();
    let text = materialize(&def.template, &params);

    assert!(text.starts_with(def.template.text()));
    assert!(text.contains("# Code added by prodforge for job 3:\n"));
    assert!(text.contains("source.firstRun: 1202\n"));
    assert!(text.contains("source.firstSubRun: 3\n"));
    assert!(text.contains("source.maxEvents: 500\n"));
    assert!(text.contains(&format!("services.SeedService.baseSeed: {}\n", params.seed)));
    assert!(text.ends_with(
        "outputs.PrimaryOutput.fileName: \"dig.mu2e.CeEndpointMix.MDC2025ac.001202_00000003.art\"\n"
    ));

    let marker = text.find("# Code added").unwrap();
    let first_run = text.find("source.firstRun").unwrap();
    let seed = text.find("services.SeedService").unwrap();
    assert!(marker < first_run && first_run < seed);
}

#[test]
fn materializer_rewrites_inputs_for_xrootd() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();
    let params = resolve(&def, 0).unwrap();

    let locator = InputLocator::new(Location::None, Protocol::Root);
    let text = Materializer::for_definition(&def, locator).render(&params).unwrap();
    assert!(text.contains("xroot://fndcadoor.fnal.gov//pnfs/fnal.gov/usr/mu2e/tape/"));
    assert!(!text.contains("\"/pnfs/mu2e/tape/"));
    // Outputs are never rewritten.
    assert!(text.contains("\"dig.mu2e.CeEndpointMix.MDC2025ac.001202_00000000.art\""));
}

#[test]
fn merge_jobs_take_run_from_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_merge(dir.path())).unwrap();
    // 8 files, 3 per job.
    assert_eq!(def.njobs, 3);

    let last = resolve(&def, 2).unwrap();
    assert_eq!(
        last.primary_inputs.as_deref(),
        Some(
            &[
                "sim.mu2e.In.v1.001000_00000006.art".to_string(),
                "sim.mu2e.In.v1.001000_00000007.art".to_string(),
            ][..]
        )
    );

    let text = materialize(&def.template, &last);
    assert!(!text.contains("source.firstRun"));
    assert!(!text.contains("source.firstSubRun"));
    assert!(text.contains(
        "source.fileNames: [ \"sim.mu2e.In.v1.001000_00000006.art\", \"sim.mu2e.In.v1.001000_00000007.art\" ]\n"
    ));
    assert!(text.contains("outputs.out.fileName: \"sim.mu2e.Merged.v1.001430_00000002.art\"\n"));
}

// ── Job maps ─────────────────────────────────────────────────────────────

#[test]
fn job_map_locates_global_indices() {
    let dir = tempfile::tempdir().unwrap();
    write_mix(dir.path());
    write_merge(dir.path());
    let map = dir.path().join("jobmap.json");
    std::fs::write(
        &map,
        r#"[
            { "definition": "mix.toml", "njobs": 40, "inloc": "tape" },
            { "tarball": "merge.toml", "njobs": 3 }
        ]"#,
    )
    .unwrap();

    let jobmap = JobMap::load(&map).unwrap();
    assert_eq!(jobmap.total_jobs(), 43);

    let token = index_token("mu2e", 41);
    assert_eq!(token, "etc.mu2e.index.000.0000041.txt");
    let global = parse_index_token(&token).unwrap();

    let (entry, local) = jobmap.locate(global).unwrap();
    assert_eq!(local, 1);
    assert_eq!(entry.inloc, "none");
    let def = load_definition(&jobmap.definition_path(entry)).unwrap();
    assert_eq!(def.name, "merge");
    assert!(resolve(&def, local).is_ok());

    assert!(jobmap.locate(43).is_none());
}

#[test]
fn tool_config_builds_locators() {
    let config = ToolConfig::default();
    let locator = config.locator(Some("dir:/data/inputs/"), None).unwrap();
    assert_eq!(locator.format("a.art").unwrap(), "/data/inputs/a.art");
    // Absolute paths are already readable.
    assert_eq!(
        locator.format("/pnfs/mu2e/tape/a.art").unwrap(),
        "/pnfs/mu2e/tape/a.art"
    );
    assert!(config.locator(Some("moon"), None).is_err());
}

// ── Parallel sweeps ──────────────────────────────────────────────────────

#[tokio::test]
async fn usage_report_covers_every_pick() {
    let dir = tempfile::tempdir().unwrap();
    let def = Arc::new(load_definition(&write_mix(dir.path())).unwrap());
    let opts = SweepOptions {
        workers: 3,
        chunk_size: 6,
    };

    let report = usage_report(def, opts).await.unwrap();
    assert_eq!(report.njobs, 40);
    let mubeam = &report.roles["physics.filters.MuBeamFlashMixer.fileNames"];
    assert_eq!(mubeam.files, 10);
    assert_eq!(mubeam.picks, 80);
    assert_eq!(mubeam.unused, 0);
    let ele = &report.roles["physics.filters.EleBeamFlashMixer.fileNames"];
    assert_eq!(ele.picks, 40);
}

#[tokio::test]
async fn sweep_agrees_with_serial_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let def = load_definition(&write_mix(dir.path())).unwrap();
    let key = "outputs.PrimaryOutput.fileName".to_string();

    let serial = resolve_range(&def, 0..def.njobs).unwrap();
    let present: HashSet<String> = serial
        .iter()
        .filter(|p| p.job_index % 7 != 3)
        .map(|p| p.output(&key).unwrap().to_string())
        .collect();

    let missing = missing_outputs(Arc::new(def), key.clone(), present, SweepOptions::default())
        .await
        .unwrap();
    let expected: Vec<(u64, String)> = serial
        .iter()
        .filter(|p| p.job_index % 7 == 3)
        .map(|p| (p.job_index, p.output(&key).unwrap().to_string()))
        .collect();
    assert_eq!(missing, expected);
}
