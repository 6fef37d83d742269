use eclipse_container::{crc32, decode, encode};

fn make_doc(size: usize) -> String {
    (0..size)
        .map(|i| (b'a' + ((i.wrapping_mul(7) ^ (i >> 3)) % 26) as u8) as char)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_crc32(bencher: divan::Bencher, size: usize) {
    let data = make_doc(size).into_bytes();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| crc32::checksum(divan::black_box(&data)));
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encode(bencher: divan::Bencher, size: usize) {
    let doc = make_doc(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encode("backup.json", divan::black_box(&doc)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decode(bencher: divan::Bencher, size: usize) {
    let bytes = encode("backup.json", &make_doc(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| decode(divan::black_box(&bytes)).unwrap());
}

fn main() {
    divan::main();
}
