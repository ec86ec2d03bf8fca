use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use multifile::Multifile;
use tempfile::tempdir;

const CHUNKS: usize = 200;
const PAYLOAD: usize = 256;

fn multifile_write_chunks(c: &mut Criterion) {
    c.bench_function("multifile_write_200_chunks", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sfm");
                let mf = Multifile::open(&path, true).unwrap();
                (dir, mf)
            },
            |(_dir, mut mf)| {
                for i in 0..CHUNKS {
                    mf.write(&format!("chunk-{:04}", i), 0, &vec![b'x'; PAYLOAD])
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn multifile_overwrite_in_place(c: &mut Criterion) {
    c.bench_function("multifile_overwrite_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sfm");
                let mut mf = Multifile::open(&path, true).unwrap();
                mf.write("hot", 0, &vec![0u8; PAYLOAD]).unwrap();
                (dir, mf)
            },
            |(_dir, mut mf)| {
                for i in 0..5_000u64 {
                    mf.write("hot", 0, &(i as u32).to_be_bytes()).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn multifile_reopen_and_read(c: &mut Criterion) {
    c.bench_function("multifile_reopen_read_200_chunks", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sfm");
                {
                    let mut mf = Multifile::open(&path, true).unwrap();
                    for i in 0..CHUNKS {
                        mf.write(&format!("chunk-{:04}", i), 0, &vec![b'x'; PAYLOAD])
                            .unwrap();
                    }
                    mf.close().unwrap();
                }
                (dir, path)
            },
            |(_dir, path)| {
                let mut mf = Multifile::open(&path, false).unwrap();
                for i in 0..CHUNKS {
                    let bytes = mf.read(&format!("chunk-{:04}", i)).unwrap().unwrap();
                    assert_eq!(bytes.len(), PAYLOAD);
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn multifile_grow_and_relocate(c: &mut Criterion) {
    c.bench_function("multifile_grow_relocate_64k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("bench.sfm");
                let mut mf = Multifile::open(&path, true).unwrap();
                // Pack three chunks so growing the first one forces a move.
                mf.write("a", 0, &vec![1u8; 512]).unwrap();
                mf.write("b", 0, &vec![2u8; 512]).unwrap();
                mf.write("c", 0, &vec![3u8; 512]).unwrap();
                (dir, mf)
            },
            |(_dir, mut mf)| {
                mf.manipulate("a", 64 * 1024, |_bytes| Ok(())).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    multifile_write_chunks,
    multifile_overwrite_in_place,
    multifile_reopen_and_read,
    multifile_grow_and_relocate,
);

criterion_main!(benches);
