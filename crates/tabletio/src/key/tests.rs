use crate::{ByteKey, Error, KeyRange};

fn key(s: &str) -> ByteKey {
    ByteKey::from(s)
}

fn range(start: &str, end: &str) -> KeyRange {
    KeyRange::new(start, end).unwrap()
}

#[test]
fn byte_keys_compare_as_unsigned_bytes() {
    let low = ByteKey::from(vec![0x7f]);
    let high = ByteKey::from(vec![0x80]);
    assert!(low < high, "0x80 must sort after 0x7f");
    assert!(ByteKey::from(vec![0xff]) > ByteKey::from(vec![0x00, 0xff]));
    assert!(key("a") < key("a\0"));
    assert!(ByteKey::EMPTY < key("\0"));
}

#[test]
fn range_rejects_out_of_order_keys() {
    assert!(matches!(
        KeyRange::new("b", "a"),
        Err(Error::MalformedRange { .. })
    ));
    assert!(matches!(
        KeyRange::new("a", "a"),
        Err(Error::MalformedRange { .. })
    ));
    assert!(KeyRange::new("z", "").is_ok());
    assert!(KeyRange::new("", "").is_ok());
}

#[test]
fn contains_respects_half_open_bounds() {
    let r = range("b", "d");
    assert!(!r.contains(&key("a")));
    assert!(r.contains(&key("b")));
    assert!(r.contains(&key("czz")));
    assert!(!r.contains(&key("d")));

    let open = KeyRange::starting_at("b");
    assert!(open.contains(&key("zzzz")));
    assert!(KeyRange::ALL.contains(&ByteKey::EMPTY));
}

#[test]
fn intersects_follows_region_rules() {
    let user = range("c", "m");
    assert!(!user.intersects(&range("a", "c")));
    assert!(user.intersects(&range("a", "c\0")));
    assert!(user.intersects(&KeyRange::starting_at("l")));
    assert!(!user.intersects(&KeyRange::starting_at("m")));
    assert!(KeyRange::ALL.intersects(&range("a", "b")));
}

#[test]
fn intersect_clips_both_bounds() {
    let user = range("c", "m");
    assert_eq!(user.intersect(&range("a", "e")), Some(range("c", "e")));
    assert_eq!(user.intersect(&range("e", "g")), Some(range("e", "g")));
    assert_eq!(
        user.intersect(&KeyRange::starting_at("k")),
        Some(range("k", "m"))
    );
    assert_eq!(
        KeyRange::starting_at("c").intersect(&KeyRange::starting_at("k")),
        Some(KeyRange::starting_at("k"))
    );
    assert_eq!(
        KeyRange::ALL.intersect(&range("", "d")),
        Some(range("", "d"))
    );
    assert_eq!(user.intersect(&range("x", "y")), None);
}

#[test]
fn interpolates_midpoint() {
    let r = range("a", "c");
    assert_eq!(r.interpolate_key(0.5).unwrap(), key("b"));
    assert_eq!(r.interpolate_key(0.0).unwrap(), key("a"));

    let mid = range("d", "m").interpolate_key(0.5).unwrap();
    assert_eq!(mid, ByteKey::from(vec![b'h', 0x80]));
}

#[test]
fn interpolates_with_open_end() {
    let mid = KeyRange::ALL.interpolate_key(0.5).unwrap();
    assert_eq!(mid, ByteKey::from(vec![0x80]));

    let upper = KeyRange::starting_at(vec![0x80]).interpolate_key(0.5).unwrap();
    assert_eq!(upper, ByteKey::from(vec![0xc0]));
}

#[test]
fn interpolation_widens_narrow_ranges() {
    let r = range("a", "b");
    let k = r.interpolate_key(0.001).unwrap();
    assert!(r.contains(&k));
    assert!(k > key("a"));

    // No key sorts strictly between a key and its zero-extension.
    let adjacent = KeyRange::new("a", "a\0").unwrap();
    assert!(adjacent.interpolate_key(0.5).is_err());
}

#[test]
fn interpolation_rejects_bad_fractions() {
    let r = range("a", "b");
    assert!(r.interpolate_key(1.0).is_err());
    assert!(r.interpolate_key(-0.1).is_err());
    assert!(r.interpolate_key(f64::NAN).is_err());
}

#[test]
fn estimates_fraction_for_key() {
    let r = range("a", "c");
    assert_eq!(r.estimate_fraction_for_key(&key("a")), 0.0);
    assert!((r.estimate_fraction_for_key(&key("b")) - 0.5).abs() < 1e-9);
    assert_eq!(r.estimate_fraction_for_key(&key("c")), 1.0);

    let all = KeyRange::ALL;
    let f = all.estimate_fraction_for_key(&ByteKey::from(vec![0x40]));
    assert!((f - 0.25).abs() < 1e-9);
}

#[test]
fn fraction_and_interpolation_agree() {
    let r = range("apple", "zebra");
    for fraction in [0.1, 0.25, 0.5, 0.9] {
        let k = r.interpolate_key(fraction).unwrap();
        let back = r.estimate_fraction_for_key(&k);
        assert!((back - fraction).abs() < 1e-6, "{fraction} -> {k} -> {back}");
    }
}

#[test]
fn split_evenly_reconstructs_range() {
    let r = range("a", "z");
    let parts = r.split_evenly(7).unwrap();
    assert_eq!(parts.len(), 7);
    assert_eq!(parts.first().unwrap().start(), r.start());
    assert_eq!(parts.last().unwrap().end(), r.end());
    for pair in parts.windows(2) {
        assert_eq!(pair[0].end(), pair[1].start());
        assert!(pair[0].start() < pair[0].end());
    }
}

#[test]
fn split_evenly_single_part_is_identity() {
    let r = range("k", "q");
    assert_eq!(r.split_evenly(1).unwrap(), vec![r]);
}

#[test]
fn display_escapes_binary() {
    let r = KeyRange::new(vec![0x00, b'a'], vec![0xff]).unwrap();
    assert_eq!(r.to_string(), "['\\x00a', '\\xFF')");
}
