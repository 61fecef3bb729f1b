use std::hint::black_box;

use av1_tile::{Packet, RepackConfig, SplitConfig, TileRepacker, TileSplitter};
use criterion::{Criterion, criterion_group, criterion_main};

#[path = "../tests/common/mod.rs"]
mod common;

fn benchmark_split_repack(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tile Split/Repack");

    // 1920x1088 key frame cut into 4x2 tiles
    let col_x = [0, 512, 1024, 1536];
    let row_y = [0, 576];
    let layout = common::layout(1920, 1088, &col_x, &row_y);
    let tiles: Vec<Vec<u8>> = (0..8).map(|idx| common::tile_data(idx, 16 * 1024)).collect();
    let unit = common::temporal_unit(
        Some(&common::seq_payload(1920, 1088)),
        &common::key_frame_payload(&layout),
        &layout,
        &tiles,
    );
    let packet = Packet::new(unit);

    let mut splitter = TileSplitter::new(SplitConfig::default()).unwrap();
    group.bench_function("Split (8 tiles)", |b| {
        b.iter(|| black_box(splitter.filter(black_box(packet.clone()))))
    });

    let mut splitter = TileSplitter::new(SplitConfig::default()).unwrap();
    let tile_packets = splitter.filter(packet.clone());
    let mut repacker = TileRepacker::new(RepackConfig {
        tile_num: 8,
        ..RepackConfig::default()
    })
    .unwrap();
    group.bench_function("Repack (8 tiles)", |b| {
        b.iter(|| {
            let mut out = None;
            for tile in &tile_packets {
                out = repacker.filter(black_box(tile.clone())).unwrap();
            }
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_split_repack);
criterion_main!(benches);
