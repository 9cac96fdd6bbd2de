//! home base CLI 分发：`run`、`doctor`、`version` 与开通子命令。

pub(crate) mod provision;

use std::path::Path;

use anyhow::anyhow;
use serde::Serialize;

use crate::{config::Config, registry::store::load_registry};

/// CLI 分发结果。
pub(crate) enum CliDispatch {
    /// 继续启动 HTTP 服务。
    Run,
    /// 命令已处理完成，主程序应退出。
    Exit,
}

/// 解析并执行 CLI。
pub(crate) fn dispatch(args: &[String]) -> anyhow::Result<CliDispatch> {
    let Some(cmd) = args.first().map(|raw| raw.trim()) else {
        return Ok(CliDispatch::Run);
    };
    if cmd.is_empty() || cmd == "run" {
        return Ok(CliDispatch::Run);
    }

    if matches!(cmd, "-h" | "--help" | "help") {
        print_root_help();
        return Ok(CliDispatch::Exit);
    }

    match cmd {
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(CliDispatch::Exit)
        }
        "doctor" => {
            let format = parse_doctor_format(&args[1..])?;
            let config = Config::from_env()?;
            let report = doctor_report(&config);
            print_doctor(&report, format)?;
            if !report.registry_ok {
                std::process::exit(1);
            }
            Ok(CliDispatch::Exit)
        }
        "network" => {
            let config = Config::from_env()?;
            match args.get(1..).unwrap_or_default() {
                [action, name] if action == "create" => {
                    let record = provision::create_network(&config.registry_path, name)?;
                    provision::print_network(&record);
                    Ok(CliDispatch::Exit)
                }
                _ => Err(anyhow!("usage: hb-homebase network create <name>")),
            }
        }
        "device" => {
            let config = Config::from_env()?;
            match args.get(1..).unwrap_or_default() {
                [action, network_id, device_id, device_type, public_key] if action == "register" => {
                    let record = provision::register_device(
                        &config.registry_path,
                        network_id,
                        device_id,
                        device_type,
                        public_key,
                    )?;
                    provision::print_device(&record);
                    Ok(CliDispatch::Exit)
                }
                _ => Err(anyhow!(
                    "usage: hb-homebase device register <network-id> <device-id> <type> <public-key-hex>"
                )),
            }
        }
        "admin" => {
            let config = Config::from_env()?;
            match args.get(1..).unwrap_or_default() {
                [action, username] if action == "create" => {
                    let record = provision::create_admin(&config.registry_path, username)?;
                    provision::print_admin(&record)?;
                    Ok(CliDispatch::Exit)
                }
                [action, username] if action == "code" => {
                    println!("{}", provision::admin_code(&config.registry_path, username)?);
                    Ok(CliDispatch::Exit)
                }
                _ => Err(anyhow!("usage: hb-homebase admin <create|code> <username>")),
            }
        }
        other => Err(anyhow!(
            "unknown command: {other}; run `hb-homebase --help` for usage"
        )),
    }
}

/// `doctor` 输出格式。
#[derive(Debug, PartialEq, Eq)]
enum DoctorFormat {
    Text,
    Json,
}

/// 解析 doctor 的 `--format` 参数。
fn parse_doctor_format(args: &[String]) -> anyhow::Result<DoctorFormat> {
    if args.is_empty() {
        return Ok(DoctorFormat::Text);
    }
    if args.len() == 2 && args[0] == "--format" {
        return match args[1].as_str() {
            "text" => Ok(DoctorFormat::Text),
            "json" => Ok(DoctorFormat::Json),
            other => Err(anyhow!("unsupported doctor format: {other}")),
        };
    }
    Err(anyhow!("usage: hb-homebase doctor [--format text|json]"))
}

/// 部署自检结果。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DoctorReport {
    addr: String,
    data_dir: String,
    registry_path: String,
    registry_ok: bool,
    registry_error: Option<String>,
    networks: usize,
    /// 缺少或无法解析签名密钥的网络 ID。
    networks_without_key: Vec<u64>,
    devices: usize,
    admins: usize,
    nonce_store: String,
    telemetry_path: String,
    session_secret_source: &'static str,
}

/// 汇总配置与注册表健康度；不修改任何文件。
fn doctor_report(config: &Config) -> DoctorReport {
    let mut report = DoctorReport {
        addr: config.addr.to_string(),
        data_dir: config.data_dir.display().to_string(),
        registry_path: config.registry_path.display().to_string(),
        registry_ok: false,
        registry_error: None,
        networks: 0,
        networks_without_key: Vec::new(),
        devices: 0,
        admins: 0,
        nonce_store: display_optional_path(config.nonce_store_path.as_deref()),
        telemetry_path: display_optional_path(config.telemetry_path.as_deref()),
        session_secret_source: if config.session_secret.is_some() {
            "env"
        } else {
            "registry"
        },
    };

    match load_registry(&config.registry_path) {
        Ok(store) => {
            report.registry_ok = true;
            report.networks = store.networks.len();
            report.networks_without_key = store
                .networks
                .values()
                .filter(|network| {
                    network
                        .signing_key
                        .as_deref()
                        .and_then(|raw| {
                            crate::crypto::keys::decode_signing_key(raw, &network.name).ok()
                        })
                        .is_none()
                })
                .map(|network| network.id)
                .collect();
            report.devices = store.devices.len();
            report.admins = store.admins.len();
        }
        Err(err) => report.registry_error = Some(err),
    }
    report
}

fn display_optional_path(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "memory".to_string())
}

fn print_doctor(report: &DoctorReport, format: DoctorFormat) -> anyhow::Result<()> {
    match format {
        DoctorFormat::Text => {
            println!("addr: {}", report.addr);
            println!("data-dir: {}", report.data_dir);
            println!("registry: {}", report.registry_path);
            println!("registry-ok: {}", if report.registry_ok { "yes" } else { "no" });
            if let Some(err) = report.registry_error.as_ref() {
                println!("registry-error: {err}");
            }
            println!("networks: {}", report.networks);
            if !report.networks_without_key.is_empty() {
                println!("networks-without-key: {:?}", report.networks_without_key);
            }
            println!("devices: {}", report.devices);
            println!("admins: {}", report.admins);
            println!("nonce-store: {}", report.nonce_store);
            println!("telemetry: {}", report.telemetry_path);
            println!("session-secret: {}", report.session_secret_source);
        }
        DoctorFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// 打印 root help。
fn print_root_help() {
    println!("hb-homebase usage:");
    println!("  hb-homebase run");
    println!("  hb-homebase doctor [--format text|json]");
    println!("  hb-homebase network create <name>");
    println!("  hb-homebase device register <network-id> <device-id> <type> <public-key-hex>");
    println!("  hb-homebase admin create <username>");
    println!("  hb-homebase admin code <username>");
    println!("  hb-homebase version");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::registry::store::{RegistryStore, persist_registry};

    fn config_for(dir: &Path) -> Config {
        Config {
            addr: "127.0.0.1:18090".parse().unwrap(),
            data_dir: dir.to_path_buf(),
            registry_path: dir.join("registry.json"),
            nonce_store_path: None,
            session_secret: None,
            nonce_cleanup_interval: Duration::from_secs(60),
            nonce_max_age_min: 10,
            store_timeout: Duration::from_secs(2),
            telemetry_path: Some(dir.join("telemetry.jsonl")),
        }
    }

    #[test]
    fn doctor_format_parsing() {
        assert_eq!(parse_doctor_format(&[]).unwrap(), DoctorFormat::Text);
        let json_args = vec!["--format".to_string(), "json".to_string()];
        assert_eq!(parse_doctor_format(&json_args).unwrap(), DoctorFormat::Json);
        let bad = vec!["--format".to_string(), "yaml".to_string()];
        assert!(parse_doctor_format(&bad).is_err());
    }

    #[test]
    fn doctor_flags_networks_without_usable_key() {
        let dir = std::env::temp_dir().join(format!("hb-doctor-{}", uuid::Uuid::new_v4().simple()));
        let config = config_for(&dir);
        let mut store = RegistryStore::new("s".to_string());
        let good = store.create_network("garden").unwrap();
        let bad = store.create_network("garage").unwrap();
        if let Some(network) = store.networks.get_mut(&bad.id) {
            network.signing_key = Some("not-hex".to_string());
        }
        store.create_admin("alice").unwrap();
        persist_registry(&config.registry_path, &store).unwrap();

        let report = doctor_report(&config);
        assert!(report.registry_ok);
        assert_eq!(report.networks, 2);
        assert_eq!(report.networks_without_key, vec![bad.id]);
        assert_ne!(good.id, bad.id);
        assert_eq!(report.admins, 1);
        assert_eq!(report.nonce_store, "memory");
        assert_eq!(report.session_secret_source, "registry");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn doctor_reports_unreadable_registry() {
        let dir = std::env::temp_dir().join(format!("hb-doctor-{}", uuid::Uuid::new_v4().simple()));
        let config = config_for(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&config.registry_path, b"{not json").unwrap();

        let report = doctor_report(&config);
        assert!(!report.registry_ok);
        assert!(report.registry_error.is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
