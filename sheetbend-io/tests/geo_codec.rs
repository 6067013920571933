use std::fs;
use std::path::{Path, PathBuf};

use sheetbend_core::geometry::{BendLine, Point2};
use sheetbend_io::{ExportOptions, GeoReader, GeoWriter, read_part, write_part};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn copy_into(dir: &Path, name: &str) -> PathBuf {
    let target = dir.join(name);
    fs::copy(fixture(name), &target).expect("复制测试数据失败");
    target
}

#[test]
fn read_plate_resolves_point_indices() {
    let part = GeoReader::new(fixture("plate.geo"))
        .read()
        .expect("读取 GEO 失败");

    assert_eq!(
        part.vertices,
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(150.0, 0.0),
            Point2::new(150.0, 60.0),
            Point2::new(0.0, 60.0),
        ]
    );
    assert_eq!(part.bends.len(), 2);
    assert_eq!(part.bends[0].start(), Point2::new(50.0, 0.0));
    assert_eq!(part.bends[0].deduction, 3.5);
    assert_eq!(part.bends[0].radius, 2.0);
    assert_eq!(part.bends[1].end(), Point2::new(100.0, 60.0));
    assert_eq!(part.bends[1].angle, 45.0);
    assert_eq!(part.bends[1].deduction, 1.75);
}

#[test]
fn overwrite_keeps_source_and_round_trips() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "plate.geo");
    let original = fs::read(&source).expect("读取源文件失败");

    let points = vec![
        Point2::new(0.0, 0.0),
        Point2::new(180.0, 0.0),
        Point2::new(180.0, 60.0),
        Point2::new(0.0, 60.0),
    ];
    let bends = vec![
        BendLine::new(Point2::new(60.0, 0.0), Point2::new(60.0, 60.0), 3.5, 2.0, 90.0),
        BendLine::new(Point2::new(120.0, 0.0), Point2::new(120.0, 60.0), 1.75, 1.5, 45.0),
    ];
    let written = GeoWriter::new(&source)
        .overwrite(&points, &bends)
        .expect("写出 GEO 失败");

    assert_eq!(written, dir.path().join("modified_plate.geo"));
    assert_eq!(fs::read(&source).expect("读取源文件失败"), original);

    let text = fs::read_to_string(&written).expect("读取写出的 GEO 失败");
    assert!(text.starts_with("#~1\n1.03\n1\nFlat pattern\n##~~\n#~KONT\nKON\n##~~\n#~31\n"));
    assert!(text.contains("P\n1\n0.000000000 0.000000000 0.000000000\n|~\n"));
    assert!(text.ends_with("#~KONT_END\n##~~\n#~EOF\n"));

    let reread = GeoReader::new(&written).read().expect("读取写出的 GEO 失败");
    assert_eq!(reread.vertices, points);
    assert_eq!(reread.bends.len(), 2);
    assert_eq!(reread.bends[0].start(), Point2::new(60.0, 0.0));
    assert_eq!(reread.bends[1].end(), Point2::new(120.0, 60.0));
    assert_eq!(reread.bends[1].angle, 45.0);
}

#[test]
fn write_part_dispatches_to_geo_writer() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let source = copy_into(dir.path(), "plate.geo");
    let data = read_part(&source).expect("读取 GEO 失败");
    assert!(data.closed);

    let options = ExportOptions {
        geo_precision: 2,
        ..ExportOptions::default()
    };
    let written =
        write_part(&source, &data.vertices, &data.bends, &options).expect("写出 GEO 失败");
    let text = fs::read_to_string(&written).expect("读取写出的 GEO 失败");
    assert!(text.contains("P\n1\n0.00 0.00 0.00\n|~\n"));

    let reread = read_part(&written).expect("读取写出的 GEO 失败");
    assert_eq!(reread.vertices, data.vertices);
    assert_eq!(reread.bends, data.bends);
}
