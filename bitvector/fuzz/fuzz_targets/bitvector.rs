#![no_main]

use arbitrary::Arbitrary;
use commonware_bitvector::{BitVector, ByteBitVector, Mode, WordBitVector};
use commonware_codec::{Decode, Encode};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeSet;

/// Largest index written, to bound allocations of the dense and byte stores.
const MAX_INDEX: i64 = 1 << 16;

#[derive(Arbitrary, Debug)]
enum Operation {
    Set(i64),
    Get(i64),
    ImportBytes(Vec<u8>),
    ImportBase64(String),
    BytesRoundtrip,
    Base64Roundtrip,
    CodecRoundtrip,
}

/// The expected contents of every store.
#[derive(Default)]
struct Model {
    bits: BTreeSet<i64>,
    len: usize,
}

impl Model {
    fn import(&mut self, bytes: &[u8]) {
        self.bits = bytes
            .iter()
            .enumerate()
            .flat_map(|(i, byte)| {
                (0..8)
                    .filter(move |bit| byte & (1u8 << bit) != 0)
                    .map(move |bit| (i * 8 + bit) as i64)
            })
            .collect();
        self.len = bytes.len() * 8;
    }
}

fn check(model: &Model, stores: &[Box<dyn BitVector>]) {
    for store in stores {
        assert_eq!(store.len(), model.len);
        for &i in &model.bits {
            assert!(store.get(i));
        }
        assert_eq!(store.to_bytes().len(), model.len.div_ceil(8));
    }
}

fn fuzz(ops: Vec<Operation>) {
    let mut model = Model::default();
    let mut stores: Vec<Box<dyn BitVector>> = vec![
        Box::new(WordBitVector::new(Mode::Sparse)),
        Box::new(WordBitVector::new(Mode::Dense)),
        Box::new(ByteBitVector::new()),
    ];

    for op in ops {
        match op {
            Operation::Set(index) => {
                if index >= MAX_INDEX {
                    continue;
                }
                for store in &mut stores {
                    assert_eq!(store.set(index).is_err(), index < 0);
                }
                if index >= 0 {
                    model.bits.insert(index);
                    model.len = model.len.max(index as usize + 1);
                }
            }

            Operation::Get(index) => {
                let expected = model.bits.contains(&index);
                for store in &stores {
                    assert_eq!(store.get(index), expected);
                }
            }

            Operation::ImportBytes(bytes) => {
                let bytes = &bytes[..bytes.len().min(MAX_INDEX as usize / 8)];
                for store in &mut stores {
                    store.import_bytes(bytes);
                }
                model.import(bytes);
            }

            Operation::ImportBase64(text) => {
                let before: Vec<Vec<u8>> = stores.iter().map(|s| s.to_bytes()).collect();
                let results: Vec<bool> = stores
                    .iter_mut()
                    .map(|store| store.import_base64(&text).is_ok())
                    .collect();

                // Every store agrees on whether the input was valid
                assert!(results.windows(2).all(|w| w[0] == w[1]));
                if results[0] {
                    model.import(&stores[0].to_bytes());
                } else {
                    for (store, bytes) in stores.iter().zip(before) {
                        assert_eq!(store.to_bytes(), bytes);
                    }
                }
            }

            Operation::BytesRoundtrip => {
                for store in &mut stores {
                    let bytes = store.to_bytes();
                    store.import_bytes(&bytes);
                }
                let bytes = stores[0].to_bytes();
                model.import(&bytes);
            }

            Operation::Base64Roundtrip => {
                for store in &mut stores {
                    let encoded = store.to_base64();
                    store.import_base64(&encoded).unwrap();
                }
                let bytes = stores[0].to_bytes();
                model.import(&bytes);
            }

            Operation::CodecRoundtrip => {
                let mut words = WordBitVector::new(Mode::Sparse);
                words.import_bytes(&stores[0].to_bytes());
                let mut buf = words.encode();
                let decoded =
                    WordBitVector::decode_cfg(&mut buf, &((..).into(), Mode::Dense)).unwrap();
                assert_eq!(decoded.to_bytes(), words.to_bytes());

                let bytes = ByteBitVector::from_bytes(&stores[2].to_bytes());
                let mut buf = bytes.encode();
                let decoded = ByteBitVector::decode_cfg(&mut buf, &(..).into()).unwrap();
                assert_eq!(decoded, bytes);
            }
        }

        // All stores serialize identically
        let expected = stores[0].to_bytes();
        for store in &stores[1..] {
            assert_eq!(store.to_bytes(), expected);
        }
        check(&model, &stores);
    }
}

fuzz_target!(|ops: Vec<Operation>| {
    fuzz(ops);
});
