//! Black-box end-to-end scenarios (S1-S6).

use resonancedb::checksum::ChecksumKind;
use resonancedb::config::StoreConfig;
use resonancedb::engine::Engine;
use resonancedb::manifest::ManifestIndex;
use resonancedb::pattern::WavePattern;
use resonancedb::segment::group::PhaseSegmentGroup;
use resonancedb::segment::{BinaryHeader, SegmentReader, SegmentWriter};
use resonancedb::shard::PhaseShardSelector;

fn constant_pattern(amp: f64, phase: f64, n: usize) -> WavePattern {
    WavePattern::new(vec![amp; n], vec![phase; n]).unwrap()
}

#[test]
fn s1_write_read_single() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phase-0-0.segment");
    let pattern = constant_pattern(0.5, 1.0, 512);
    // Content-addressed ids are derived from the pattern itself, not an
    // external label, so this stands in for the scenario's md5hex("pattern-123").
    let id = pattern.derive_id();

    let mut writer = SegmentWriter::open(&path, ChecksumKind::Crc32, 1024 * 1024).unwrap();
    assert_eq!(writer.header().version, 1);
    let offset = writer.write(&id, &pattern).unwrap();
    writer.flush().unwrap();
    assert_eq!(writer.header().record_count, 1);
    assert!(writer.header().last_offset > BinaryHeader::size_for(ChecksumKind::Crc32) as u64);

    let mut reader = SegmentReader::open(&path).unwrap();
    let (read_id, read_offset, read_pattern) = reader.read_with_id(offset).unwrap();
    assert_eq!(read_id, id);
    assert_eq!(read_offset, offset);
    for (a, b) in read_pattern.amp().iter().zip(pattern.amp().iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn s2_kernel_identity() {
    use resonancedb::kernel::{CompareOptions, DefaultResonanceKernel, ResonanceKernel};
    let kernel = DefaultResonanceKernel::new();
    let p = constant_pattern(1.0, 0.7, 16);
    let energy = kernel.compare(&p, &p, CompareOptions::default()).unwrap();
    assert!((energy - 1.0).abs() < 1e-9);
    let (energy2, delta) = kernel.compare_with_phase_delta(&p, &p).unwrap();
    assert!((energy2 - 1.0).abs() < 1e-9);
    assert!(delta.abs() < 1e-9);
}

#[test]
fn s3_kernel_antiphase() {
    use resonancedb::kernel::{CompareOptions, DefaultResonanceKernel, ResonanceKernel};
    let kernel = DefaultResonanceKernel::new();
    let a = WavePattern::new(vec![1.0; 4], vec![0.0; 4]).unwrap();
    let b = WavePattern::new(vec![1.0; 4], vec![std::f64::consts::PI; 4]).unwrap();
    let energy = kernel.compare(&a, &b, CompareOptions::default()).unwrap();
    assert!(energy < 1e-9);
}

#[test]
fn s4_shard_wrap_around() {
    use std::collections::BTreeMap;
    use ordered_float::OrderedFloat;
    let mut map = BTreeMap::new();
    map.insert(OrderedFloat(-3.0), "seg-neg3".to_string());
    map.insert(OrderedFloat(0.0), "seg-0".to_string());
    map.insert(OrderedFloat(3.0), "seg-3".to_string());
    let selector = PhaseShardSelector::explicit(map, 0.5);

    let query = constant_pattern(1.0, 3.1, 2);
    let shards = selector.relevant_shards(&query, 0.5);
    assert!(shards.contains(&"seg-3".to_string()));
    assert!(shards.contains(&"seg-neg3".to_string()));
}

#[test]
fn s5_compaction_reclaims_sparse_segments() {
    use resonancedb::segment::DefaultSegmentCompactor;

    let dir = tempfile::tempdir().unwrap();
    let mut manifest = ManifestIndex::load(dir.path().join("manifest.json")).unwrap();
    // Small target so each write overflows its segment, leaving many sparse ones.
    let group = PhaseSegmentGroup::new("phase-0".into(), dir.path(), ChecksumKind::Crc32, 2048);

    let mut all_ids = Vec::new();
    for i in 0..100 {
        let p = WavePattern::new(vec![i as f64 + 1.0, 2.0], vec![0.1, -0.1]).unwrap();
        let id = p.derive_id();
        let offset = group.with_writable(|w| w.write(&id, &p)).unwrap();
        let segment_name = group.all_segment_names().last().cloned().unwrap_or_default();
        manifest.put(resonancedb::manifest::PatternLocation {
            id,
            segment_name,
            offset,
            phase_center: p.mean_phase(),
        });
        all_ids.push(id);
    }
    manifest.flush().unwrap();

    let compactor = DefaultSegmentCompactor::new(ChecksumKind::Crc32, 1024 * 1024);
    compactor.compact(&group, &mut manifest).unwrap();

    assert_eq!(group.all_segment_names().len(), 1);
    let merged_name = &group.all_segment_names()[0];
    let merged_path = dir.path().join(merged_name);
    let mut reader = SegmentReader::open(&merged_path).unwrap();
    let found: Vec<_> = reader.read_all_with_id().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(found.len(), 100);
    for id in &all_ids {
        assert!(manifest.contains(id));
    }
}

#[test]
fn s6_crash_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("phase-0-0.segment");
    {
        let mut writer = SegmentWriter::open(&path, ChecksumKind::Crc32, 1024 * 1024).unwrap();
        for i in 0..3 {
            let p = WavePattern::new(vec![i as f64], vec![0.0]).unwrap();
            let id = p.derive_id();
            writer.write(&id, &p).unwrap();
        }
        // Crash: no flush.
    }

    let reader_check = SegmentReader::open(&path).unwrap();
    assert!(!reader_check.header().commit_flag);
    drop(reader_check);

    let mut reader = SegmentReader::open(&path).unwrap();
    let recovered: Vec<_> = reader.read_all_with_id().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(recovered.len(), 3);

    // A subsequent writer recovers and commits.
    let mut writer = SegmentWriter::open(&path, ChecksumKind::Crc32, 1024 * 1024).unwrap();
    writer.flush().unwrap();
    assert!(writer.header().commit_flag);

    let mut reader2 = SegmentReader::open(&path).unwrap();
    assert!(reader2.header().commit_flag);
    let recovered2: Vec<_> = reader2.read_all_with_id().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(recovered2.len(), 3);
}

#[test]
fn engine_roundtrips_through_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = constant_pattern(0.8, 0.2, 16);
    let id = {
        let engine = Engine::open(dir.path(), StoreConfig::default()).unwrap();
        engine.insert(&pattern, serde_json::json!({"k": "v"})).unwrap()
    };
    let engine = Engine::open(dir.path(), StoreConfig::default()).unwrap();
    let results = engine.search(&pattern, 3, std::f64::consts::PI).unwrap();
    assert!(results.iter().any(|r| r.id == id));
}
