use std::env;

/// Build-time node settings and the value used when `.env` leaves them out.
/// An empty default means the firmware refuses to start until it is set.
const NODE_SETTINGS: &[(&str, &str)] = &[
    ("BEACON_WIFI_SSID", ""),
    ("BEACON_WIFI_PASS", ""),
    ("BEACON_COLLECTOR_ADDR", "192.168.1.100"),
    ("BEACON_COLLECTOR_PORT", "12345"),
    ("BEACON_RECEIVER_ID", "1"),
    ("BEACON_REPORT_INTERVAL_MS", "500"),
    ("BEACON_JOIN_POLL_MS", "1000"),
];

fn main() {
    let _ = dotenvy::from_filename(".env");

    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=build.rs");

    for (key, default) in NODE_SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        let val = env::var(key).unwrap_or_else(|_| default.to_string());
        println!("cargo:rustc-env={key}={val}");
    }

    // Bind port follows the collector port unless set on its own
    println!("cargo:rerun-if-env-changed=BEACON_BIND_PORT");
    let bind_port = env::var("BEACON_BIND_PORT")
        .or_else(|_| env::var("BEACON_COLLECTOR_PORT"))
        .unwrap_or_else(|_| "12345".to_string());
    println!("cargo:rustc-env=BEACON_BIND_PORT={bind_port}");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
