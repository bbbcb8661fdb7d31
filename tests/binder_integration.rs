//! Integration tests for the configuration binder and expander

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use svckit::binder::{bind_with, Bind, Binder, Options};
use svckit::decode::Decode;
use svckit::error::{BindError, DecodeError, ExpandError};
use svckit::expand::expand;
use svckit::lookup::{Chain, MapLookup, TomlLookup};
use svckit::tag::FieldTag;

fn options(pairs: &[(&str, &str)]) -> Options {
    Options::default().with_lookup(pairs.iter().copied().collect::<MapLookup>())
}

/// Lookup that records every key it is asked for
fn recording(pairs: &[(&str, &str)]) -> (Options, Arc<Mutex<Vec<String>>>) {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let lookup = move |key: &str| {
        recorder.lock().unwrap().push(key.to_string());
        values.get(key).cloned()
    };
    (Options::default().with_lookup(lookup), seen)
}

#[derive(Debug, Default, PartialEq)]
struct AppConfig {
    host: String,
    port: i64,
    timeout: Duration,
    debug: bool,
}

svckit::bindable!(AppConfig {
    host: ",required",
    port: ",default:8080",
    timeout: ",unit:s",
    debug: "",
});

#[cfg(unix)]
#[test]
fn test_env_value_with_invalid_utf8_counts_as_set() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    std::env::set_var("SVCKIT_BAD_UTF8_HOST", OsStr::from_bytes(&[0x66, 0xff, 0x6f]));
    let mut config = AppConfig::default();
    bind_with(&mut config, &Options::default().with_prefix("SVCKIT_BAD_UTF8_")).unwrap();

    assert_eq!(config.host, "f\u{fffd}o");
    assert_eq!(config.port, 8080);
}

#[test]
fn test_simple_record() {
    let mut config = AppConfig::default();
    bind_with(
        &mut config,
        &options(&[("HOST", "localhost"), ("TIMEOUT", "30"), ("DEBUG", "true")]),
    )
    .unwrap();

    assert_eq!(
        config,
        AppConfig {
            host: "localhost".to_string(),
            port: 8080,
            timeout: Duration::from_secs(30),
            debug: true,
        }
    );
}

#[derive(Debug, Default)]
struct ProxyConfig {
    host: String,
}

svckit::bindable!(ProxyConfig { host: "" });

#[derive(Debug, Default)]
struct WithProxy {
    proxy: ProxyConfig,
}

svckit::bindable!(WithProxy {
    nested proxy: ",prefix:HTTP_PROXY_",
});

#[test]
fn test_nested_with_prefix() {
    let mut config = WithProxy::default();
    bind_with(&mut config, &options(&[("HTTP_PROXY_HOST", "p.example")])).unwrap();
    assert_eq!(config.proxy.host, "p.example");
}

#[test]
fn test_slice_custom_split_with_default() {
    #[derive(Default)]
    struct Roles {
        roles: Vec<String>,
    }
    svckit::bindable!(Roles {
        roles: ",split:';',default:'a;b'",
    });

    let mut record = Roles::default();
    bind_with(&mut record, &options(&[])).unwrap();
    assert_eq!(record.roles, vec!["a", "b"]);
}

#[test]
fn test_key_derivation_from_field_names() {
    struct Camel;

    impl Bind for Camel {
        fn bind_fields(&mut self, binder: &mut Binder<'_>) -> Result<(), BindError> {
            for name in ["myVariable", "APIService", "myAPIService", "serviceAPI", "ID", "api_key"] {
                let mut value = String::new();
                binder.field(name, "", &mut value)?;
            }
            let mut value = String::new();
            binder.field("ignored", "EXPLICIT_NAME", &mut value)
        }
    }

    let (opts, seen) = recording(&[]);
    bind_with(&mut Camel, &opts.with_prefix("APP_")).unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "APP_MY_VARIABLE",
            "APP_API_SERVICE",
            "APP_MY_API_SERVICE",
            "APP_SERVICE_API",
            "APP_ID",
            "APP_API_KEY",
            "APP_EXPLICIT_NAME",
        ]
    );
}

#[test]
fn test_absent_and_blank_default_asymmetry() {
    #[derive(Default)]
    struct Pair {
        with_default: u32,
        without_default: String,
    }
    svckit::bindable!(Pair {
        with_default: ",default:7",
        without_default: "",
    });

    let mut record = Pair {
        with_default: 1,
        without_default: "kept".to_string(),
    };
    bind_with(&mut record, &options(&[])).unwrap();
    assert_eq!(record.with_default, 7);
    assert_eq!(record.without_default, "kept");

    let mut record = Pair {
        with_default: 1,
        without_default: "kept".to_string(),
    };
    bind_with(
        &mut record,
        &options(&[("WITH_DEFAULT", ""), ("WITHOUT_DEFAULT", "")]),
    )
    .unwrap();
    assert_eq!(record.with_default, 7);
    assert_eq!(record.without_default, "");
}

#[test]
fn test_required_absent_names_prefixed_key() {
    let mut config = AppConfig::default();
    let err = bind_with(&mut config, &options(&[]).with_prefix("SVC_")).unwrap_err();
    assert_eq!(err.key(), Some("SVC_HOST"));
    assert!(err.to_string().contains("SVC_HOST"));
}

#[test]
fn test_inline_matches_flat_keys() {
    #[derive(Default)]
    struct Common {
        region: String,
        zone: String,
    }
    svckit::bindable!(Common {
        region: "",
        zone: "",
    });

    #[derive(Default)]
    struct Inlined {
        name: String,
        common: Common,
    }
    svckit::bindable!(Inlined {
        name: "",
        nested common: ",inline",
    });

    #[derive(Default)]
    struct Flat {
        name: String,
        region: String,
        zone: String,
    }
    svckit::bindable!(Flat {
        name: "",
        region: "",
        zone: "",
    });

    let (inline_opts, inline_seen) = recording(&[]);
    bind_with(&mut Inlined::default(), &inline_opts.with_prefix("P_")).unwrap();
    let (flat_opts, flat_seen) = recording(&[]);
    bind_with(&mut Flat::default(), &flat_opts.with_prefix("P_")).unwrap();

    assert_eq!(*inline_seen.lock().unwrap(), *flat_seen.lock().unwrap());
}

#[test]
fn test_slices_split_and_empty() {
    #[derive(Default)]
    struct Lists {
        ports: Vec<u16>,
        peers: Vec<SocketAddr>,
        tags: Vec<String>,
        missing: Vec<String>,
    }
    svckit::bindable!(Lists {
        ports: "",
        peers: ",split:' '",
        tags: "",
        missing: "",
    });

    let mut record = Lists {
        missing: vec!["untouched".to_string()],
        ..Default::default()
    };
    bind_with(
        &mut record,
        &options(&[
            ("PORTS", "80,443,8080"),
            ("PEERS", "10.0.0.1:7000 10.0.0.2:7000"),
            ("TAGS", ""),
        ]),
    )
    .unwrap();

    assert_eq!(record.ports, vec![80, 443, 8080]);
    assert_eq!(record.peers.len(), 2);
    assert_eq!(record.peers[1], "10.0.0.2:7000".parse::<SocketAddr>().unwrap());
    assert!(record.tags.is_empty());
    assert_eq!(record.missing, vec!["untouched"]);
}

#[test]
fn test_pointer_chain_allocation() {
    #[derive(Default)]
    struct Pointers {
        retries: Option<Option<u32>>,
        boxed: Option<Box<String>>,
        absent: Option<u32>,
    }
    svckit::bindable!(Pointers {
        retries: "",
        boxed: "",
        absent: "",
    });

    let mut record = Pointers::default();
    bind_with(&mut record, &options(&[("RETRIES", "3"), ("BOXED", "x")])).unwrap();
    assert_eq!(record.retries, Some(Some(3)));
    assert_eq!(record.boxed.as_deref().map(String::as_str), Some("x"));
    assert_eq!(record.absent, None);
}

/// Comma separated list that keeps commas inside brackets together
#[derive(Debug, Default, PartialEq)]
struct Groups(Vec<String>);

impl Decode for Groups {
    fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
        let mut groups = Vec::new();
        let mut depth = 0usize;
        let mut current = String::new();
        for c in raw.chars() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| DecodeError::invalid(raw, "groups", "unbalanced ]"))?
                }
                ',' if depth == 0 => {
                    groups.push(std::mem::take(&mut current));
                    continue;
                }
                _ => {}
            }
            current.push(c);
        }
        groups.push(current);
        Ok(Groups(groups))
    }
}

#[test]
fn test_custom_decoder_takes_precedence() {
    #[derive(Default)]
    struct WithGroups {
        groups: Groups,
    }
    svckit::bindable!(WithGroups { groups: "" });

    let mut record = WithGroups::default();
    bind_with(&mut record, &options(&[("GROUPS", "a,[b,c],d")])).unwrap();
    assert_eq!(record.groups, Groups(vec!["a".into(), "[b,c]".into(), "d".into()]));

    let err = bind_with(&mut record, &options(&[("GROUPS", "a]")])).unwrap_err();
    assert_eq!(err.field(), "groups");
}

#[test]
fn test_times_and_bytes() {
    #[derive(Default)]
    struct Mixed {
        started: Option<DateTime<Utc>>,
        released: Option<NaiveDate>,
        epoch: Option<DateTime<Utc>>,
        token: Vec<u8>,
        seed: Vec<u8>,
    }
    svckit::bindable!(Mixed {
        started: "",
        released: ",format:date",
        epoch: ",format:unix,unit:ms",
        token: ",format:hex",
        seed: ",format:base64",
    });

    let mut record = Mixed::default();
    bind_with(
        &mut record,
        &options(&[
            ("STARTED", "2024-03-01T12:00:00Z"),
            ("RELEASED", "2023-11-05"),
            ("EPOCH", "1700000000000"),
            ("TOKEN", "cafe"),
            ("SEED", "aGVsbG8="),
        ]),
    )
    .unwrap();

    assert_eq!(record.started.unwrap().to_rfc3339(), "2024-03-01T12:00:00+00:00");
    assert_eq!(record.released, NaiveDate::from_ymd_opt(2023, 11, 5));
    assert_eq!(record.epoch.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(record.token, vec![0xca, 0xfe]);
    assert_eq!(record.seed, b"hello".to_vec());
}

#[test]
fn test_unknown_format_and_unit_are_reported() {
    #[derive(Default)]
    struct BadFormat {
        data: Vec<u8>,
    }
    svckit::bindable!(BadFormat {
        data: ",format:base58",
    });

    let err = bind_with(&mut BadFormat::default(), &options(&[("DATA", "abc")])).unwrap_err();
    assert!(err.to_string().contains("\"base58\""));

    #[derive(Default)]
    struct BadUnit {
        wait: Duration,
    }
    svckit::bindable!(BadUnit { wait: ",unit:days" });

    let err = bind_with(&mut BadUnit::default(), &options(&[("WAIT", "3")])).unwrap_err();
    assert!(err.to_string().contains("\"days\""));
}

#[test]
fn test_toml_file_under_environment() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "host = \"file-host\"\nport = 9000\n\n[http_proxy]\nhost = \"file-proxy\"").unwrap();
    let toml = TomlLookup::load(file.path()).unwrap();

    let overrides = MapLookup::new().with("PORT", "9100");
    let opts = Options::default().with_lookup(Chain::new().with(overrides).with(toml));

    let mut config = AppConfig::default();
    bind_with(&mut config, &opts).unwrap();
    assert_eq!(config.host, "file-host");
    assert_eq!(config.port, 9100);

    let mut proxy = WithProxy::default();
    bind_with(&mut proxy, &opts).unwrap();
    assert_eq!(proxy.proxy.host, "file-proxy");
}

#[test]
fn test_concurrent_binds_on_distinct_records() {
    let opts = options(&[("HOST", "h"), ("PORT", "1")]);
    let results: Vec<AppConfig> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let mut config = AppConfig::default();
                    bind_with(&mut config, &opts).unwrap();
                    config
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(results.iter().all(|c| c.host == "h" && c.port == 1));
}

#[test]
fn test_expand_mixed_template() {
    let opts = options(&[("USER", "foo"), ("HOST", "bar"), ("PORT", "8080")]);
    assert_eq!(
        expand("user=$USER, pass=$$ECRET, dsn=${USER}@${HOST}:${PORT}", &opts).unwrap(),
        "user=foo, pass=$ECRET, dsn=foo@bar:8080"
    );
}

#[test]
fn test_expand_errors() {
    let opts = options(&[]);
    assert_eq!(
        expand("${X}", &opts).unwrap_err(),
        ExpandError::UndefinedVariable { key: "X".to_string() }
    );
    assert!(matches!(
        expand("prefix ${OPEN", &opts).unwrap_err(),
        ExpandError::Syntax { .. }
    ));
    assert_eq!(expand("no variables here", &opts).unwrap(), "no variables here");
}
