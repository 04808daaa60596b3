// Property: a key built from the grammar passes the structural check iff it
// carries a device suffix, and decoding recovers the URL, scheme and device.

use nginx_cache_admin::{CacheAdminConfig, Device, KeyCodec};
use proptest::prelude::*;

fn codec() -> KeyCodec {
    KeyCodec::new(&CacheAdminConfig::default()).unwrap()
}

fn scheme() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("http"), Just("https")]
}

fn device() -> impl Strategy<Value = Device> {
    prop_oneof![Just(Device::Desktop), Just(Device::Mobile), Just(Device::All)]
}

// Host, path and query; never ends in '/' or a device word
fn url_tail() -> impl Strategy<Value = String> {
    "[a-z]{1,12}\\.(com|org|net)(/[a-z0-9-]{1,10}){0,3}(\\?[a-z]=[0-9]{1,3})?"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The structural check accepts exactly the keys with a device suffix
    #[test]
    fn prop_is_cache_key_iff_device_suffix(
        scheme in scheme(),
        tail in url_tail(),
        device in device(),
    ) {
        let key = format!("nginx-cache:{}GET{}{}", scheme, tail, device.suffix());
        let codec = codec();

        prop_assert_eq!(codec.is_cache_key(&key), device != Device::All);
        prop_assert_eq!(codec.matches_strict(&key), device != Device::All);
    }

    /// Decoding a grammar key recovers its parts
    #[test]
    fn prop_decode_recovers_parts(
        scheme in scheme(),
        tail in url_tail(),
        device in device(),
    ) {
        let key = format!("nginx-cache:{}GET{}{}", scheme, tail, device.suffix());
        let entry = codec().decode(&key);

        prop_assert_eq!(&entry.url, &tail);
        prop_assert_eq!(&entry.full_url, &format!("{}://{}", scheme, tail));
        prop_assert_eq!(entry.device, device);
        prop_assert_eq!(&entry.raw_key, &key);
        prop_assert_eq!(entry.well_formed, device != Device::All);
    }

    /// A trailing slash before the suffix is dropped from the decoded URL
    #[test]
    fn prop_decode_trims_trailing_slash(
        scheme in scheme(),
        tail in url_tail(),
        device in device(),
    ) {
        let key = format!("nginx-cache:{}GET{}/{}", scheme, tail, device.suffix());
        let entry = codec().decode(&key);

        prop_assert_eq!(&entry.url, &tail);
        prop_assert!(!entry.full_url.ends_with('/'));
    }

    /// Encoding then decoding gives back the scheme-qualified URL
    #[test]
    fn prop_encode_then_decode(
        scheme in scheme(),
        tail in url_tail(),
        device in device(),
    ) {
        let url = format!("{}://{}", scheme, tail);
        let codec = codec();
        let entry = codec.decode(&codec.encode(&url, device));

        prop_assert_eq!(entry.full_url, url);
        prop_assert_eq!(entry.device, device);
    }

    /// Decode never panics, whatever the input
    #[test]
    fn prop_decode_is_total(key in ".*") {
        let entry = codec().decode(&key);
        prop_assert_eq!(entry.raw_key, key);
    }

    /// Keys under a different prefix never pass the structural check
    #[test]
    fn prop_foreign_prefix_rejected(
        prefix in "[a-m]{1,8}:",
        scheme in scheme(),
        tail in url_tail(),
    ) {
        prop_assume!(prefix != "nginx-cache:");
        let key = format!("{}{}GET{}Desktop", prefix, scheme, tail);
        prop_assert!(!codec().is_cache_key(&key));
    }
}
