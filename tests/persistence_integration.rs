//! Disk-backed tests: heap files must survive close and reopen.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use granary::heap::{create_heap_file, HeapFile, HeapFileScan, InsertFileScan};
use granary::storage::{BufferPool, Db, DiskVfs, FileStorage};

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let db = Db::new(DiskVfs::new(dir.path()));
    let pool: BufferPool<FileStorage> = BufferPool::new(16);

    create_heap_file(&db, &pool, "r").await.unwrap();

    let rid = {
        let mut scan = InsertFileScan::open(&db, &pool, "r").await.unwrap();
        let rid = scan.insert_record(b"durable payload").await.unwrap();
        scan.insert_record(&vec![3u8; 4000]).await.unwrap();
        scan.close().await.unwrap();
        rid
    };

    // Same process, fresh pool and file layer: everything must come off
    // the disk
    let db2 = Db::new(DiskVfs::new(dir.path()));
    let pool2: BufferPool<FileStorage> = BufferPool::new(16);

    let mut file = HeapFile::open(&db2, &pool2, "r").await.unwrap();
    assert_eq!(file.rec_count(), 2);
    assert_eq!(file.record(rid).await.unwrap(), b"durable payload");
    file.close().await.unwrap();
}

#[tokio::test]
async fn test_header_counts_survive_reopen() {
    let dir = tempdir().unwrap();
    let db = Db::new(DiskVfs::new(dir.path()));
    let pool: BufferPool<FileStorage> = BufferPool::new(16);

    create_heap_file(&db, &pool, "r").await.unwrap();
    {
        let mut scan = InsertFileScan::open(&db, &pool, "r").await.unwrap();
        // Force the chain past one data page
        for _ in 0..9 {
            scan.insert_record(&vec![0u8; 2000]).await.unwrap();
        }
        let pages = scan.file().page_count();
        assert!(pages >= 3);
        scan.close().await.unwrap();
    }

    let db2 = Db::new(DiskVfs::new(dir.path()));
    let pool2: BufferPool<FileStorage> = BufferPool::new(16);
    let file = HeapFile::open(&db2, &pool2, "r").await.unwrap();
    assert_eq!(file.rec_count(), 9);
    assert!(file.page_count() >= 3);
    file.close().await.unwrap();
}

#[tokio::test]
async fn test_randomized_fill_and_scan() {
    let dir = tempdir().unwrap();
    let db = Db::new(DiskVfs::new(dir.path()));
    // Pool smaller than the data set, so eviction and write-back run
    let pool: BufferPool<FileStorage> = BufferPool::new(8);

    create_heap_file(&db, &pool, "r").await.unwrap();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut lengths = Vec::new();
    {
        let mut scan = InsertFileScan::open(&db, &pool, "r").await.unwrap();
        for _ in 0..200 {
            let len = rng.gen_range(1..=3000);
            let fill = rng.gen::<u8>();
            scan.insert_record(&vec![fill; len]).await.unwrap();
            lengths.push(len);
        }
        assert_eq!(scan.file().rec_count(), 200);
        scan.close().await.unwrap();
    }

    // Scan everything back and compare the multiset of lengths
    let mut scan = HeapFileScan::open(&db, &pool, "r").await.unwrap();
    scan.start_scan(None);
    let mut seen = Vec::new();
    while let Some(_rid) = scan.scan_next().await.unwrap() {
        seen.push(scan.record().unwrap().len());
    }
    scan.close().await.unwrap();

    lengths.sort_unstable();
    seen.sort_unstable();
    assert_eq!(seen, lengths);
}
