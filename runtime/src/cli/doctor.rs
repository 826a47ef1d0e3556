//! Environment readiness check.

use crate::config::CrawlConfig;
use crate::profile::SiteProfile;
use crate::renderer::chromium::find_chromium;
use crate::session::credentials::Credentials;
use anyhow::Result;
use std::path::PathBuf;

/// Report Chromium availability, credential sources and the effective config.
pub async fn run() -> Result<()> {
    println!("Sitecrawl Doctor");
    println!("================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let config = match CrawlConfig::default().apply_env() {
        Ok(config) => {
            println!("[OK] SITECRAWL_* environment parses");
            config
        }
        Err(e) => {
            println!("[!!] {e}");
            CrawlConfig::default()
        }
    };
    if let Err(e) = config.validate() {
        println!("[!!] {e}");
    }
    println!(
        "     pacing {:.1}-{:.1}s, {} worker(s), {} retries, {} rebuilds",
        config.min_delay_ms as f64 / 1000.0,
        config.max_delay_ms as f64 / 1000.0,
        config.workers,
        config.max_navigation_retries,
        config.max_context_rebuilds
    );

    let chromium = find_chromium(config.chromium_path.as_deref());
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set SITECRAWL_CHROMIUM_PATH."
        ),
    }

    let cookie_file = std::env::var("SITECRAWL_COOKIES_FILE").ok().map(PathBuf::from);
    let credentials = match Credentials::from_env(cookie_file.as_deref()) {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("[!!] {e}");
            Credentials::default()
        }
    };
    if credentials.is_present() {
        println!("[OK] Credentials available ({})", credential_source(&credentials));
    } else {
        println!("[??] No credentials: only anonymous profiles will run");
    }

    println!();
    for name in SiteProfile::BUILTIN {
        let profile = SiteProfile::by_name(name)?;
        let ready = chromium.is_some() && (!profile.requires_login() || credentials.is_present());
        println!(
            "Profile {name:<10} {}",
            if ready { "READY" } else { "NOT READY" }
        );
    }

    Ok(())
}

fn credential_source(credentials: &Credentials) -> &'static str {
    if credentials.cookies.as_ref().is_some_and(|c| !c.is_empty()) {
        "cookie file"
    } else {
        "username/password"
    }
}
