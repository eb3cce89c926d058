use graphark::archive;
use graphark::codec::{decode_varint, encode_varint, varint_len, zigzag_decode, zigzag_encode, ByteReader, ByteWriter};
use graphark::Registry;
use proptest::prelude::*;

type Sample = (Vec<i64>, Vec<String>, (Option<u16>, bool, char));

fn sample() -> impl Strategy<Value = Sample> {
    (
        prop::collection::vec(any::<i64>(), 0..16),
        prop::collection::vec(".{0,12}", 0..6),
        (any::<Option<u16>>(), any::<bool>(), any::<char>()),
    )
}

proptest! {
    #[test]
    fn varint_round_trips(value in any::<u64>()) {
        let mut buf = Vec::new();
        encode_varint(&mut buf, value);
        prop_assert_eq!(buf.len(), varint_len(value));
        prop_assert_eq!(decode_varint(&buf), Ok((value, buf.len())));
    }

    #[test]
    fn zigzag_round_trips(value in any::<i64>()) {
        prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        // Small magnitudes map to small codes.
        if (-64..64).contains(&value) {
            prop_assert!(zigzag_encode(value) < 128);
        }
    }

    #[test]
    fn integers_round_trip_at_every_width(
        a in any::<u8>(), b in any::<u16>(), c in any::<u32>(), d in any::<u64>(),
        e in any::<i8>(), f in any::<i16>(), g in any::<i32>(), h in any::<i64>(),
        packed in any::<bool>(),
    ) {
        let mut w = ByteWriter::new();
        w.write_unsigned(a, packed);
        w.write_unsigned(b, packed);
        w.write_unsigned(c, packed);
        w.write_unsigned(d, packed);
        w.write_signed(e, packed);
        w.write_signed(f, packed);
        w.write_signed(g, packed);
        w.write_signed(h, packed);

        let mut r = ByteReader::new(w.as_slice());
        prop_assert_eq!(r.read_unsigned::<u8>(packed).unwrap(), a);
        prop_assert_eq!(r.read_unsigned::<u16>(packed).unwrap(), b);
        prop_assert_eq!(r.read_unsigned::<u32>(packed).unwrap(), c);
        prop_assert_eq!(r.read_unsigned::<u64>(packed).unwrap(), d);
        prop_assert_eq!(r.read_signed::<i8>(packed).unwrap(), e);
        prop_assert_eq!(r.read_signed::<i16>(packed).unwrap(), f);
        prop_assert_eq!(r.read_signed::<i32>(packed).unwrap(), g);
        prop_assert_eq!(r.read_signed::<i64>(packed).unwrap(), h);
        prop_assert!(r.is_empty());
    }

    #[test]
    fn values_round_trip_through_an_archive(value in sample(), packed in any::<bool>()) {
        let options = graphark::EncodeOptions { pack_integers: packed, ..Default::default() };
        let bytes = archive::encode_with(&value, &options).unwrap();
        let back: Sample = archive::decode(&bytes, &Registry::new()).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn every_truncation_is_an_error(value in sample()) {
        let bytes = archive::encode(&value, 1).unwrap();
        for len in 0..bytes.len() {
            prop_assert!(archive::decode::<Sample>(&bytes[..len], &Registry::new()).is_err(), "prefix {}", len);
        }
    }

    #[test]
    fn corrupted_bytes_never_panic(value in sample(), index in any::<prop::sample::Index>(), byte in any::<u8>()) {
        let mut bytes = archive::encode(&value, 1).unwrap();
        let at = index.index(bytes.len());
        bytes[at] = byte;
        let _ = archive::decode::<Sample>(&bytes, &Registry::new());
        let _ = archive::Archive::from_bytes(&bytes).and_then(|ar| ar.dump(&Default::default()));
    }
}
