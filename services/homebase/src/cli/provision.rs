//! 开通子命令：创建网络、登记设备、创建管理员。
//!
//! 直接改写注册表文件；运行中的服务在下一次查找时读到新记录。

use std::path::Path;

use anyhow::{Context, anyhow};

use crate::{
    api::types::{ANSI_BOLD, ANSI_CYAN, ANSI_RESET, ANSI_WHITE},
    auth::totp,
    registry::store::{AdminRecord, DeviceRecord, NetworkRecord, load_registry, persist_registry},
};

/// 创建网络并落盘。
pub(crate) fn create_network(registry_path: &Path, name: &str) -> anyhow::Result<NetworkRecord> {
    let mut store = load_registry(registry_path).map_err(anyhow::Error::msg)?;
    let record = store.create_network(name).map_err(anyhow::Error::msg)?;
    persist_registry(registry_path, &store).map_err(anyhow::Error::msg)?;
    Ok(record)
}

/// 登记设备公钥并落盘。
pub(crate) fn register_device(
    registry_path: &Path,
    network_id: &str,
    device_id: &str,
    device_type: &str,
    public_key_hex: &str,
) -> anyhow::Result<DeviceRecord> {
    let network_id = network_id
        .trim()
        .parse::<u64>()
        .with_context(|| format!("invalid network id: {network_id}"))?;
    let mut store = load_registry(registry_path).map_err(anyhow::Error::msg)?;
    let record = store
        .register_device(network_id, device_id, device_type, public_key_hex)
        .map_err(anyhow::Error::msg)?;
    persist_registry(registry_path, &store).map_err(anyhow::Error::msg)?;
    Ok(record)
}

/// 创建管理员并落盘。
pub(crate) fn create_admin(registry_path: &Path, username: &str) -> anyhow::Result<AdminRecord> {
    let mut store = load_registry(registry_path).map_err(anyhow::Error::msg)?;
    let record = store.create_admin(username).map_err(anyhow::Error::msg)?;
    persist_registry(registry_path, &store).map_err(anyhow::Error::msg)?;
    Ok(record)
}

/// 管理员当前验证码（台架调试用）。
pub(crate) fn admin_code(registry_path: &Path, username: &str) -> anyhow::Result<String> {
    let store = load_registry(registry_path).map_err(anyhow::Error::msg)?;
    let admin = store
        .admins
        .get(username.trim())
        .ok_or_else(|| anyhow!("admin `{}` not found", username.trim()))?;
    totp::current_code(&admin.totp_secret)
        .ok_or_else(|| anyhow!("admin `{}` has an undecodable totp secret", admin.username))
}

/// 打印网络开通结果。
pub(crate) fn print_network(record: &NetworkRecord) {
    print_title("网络已开通");
    print_field("networkId", &record.id.to_string());
    print_field("名称", &record.name);
    print_field("公钥", &record.public_key);
    print_field("提示", "运行中的 hb-homebase 即时生效；公钥需烧录到该网络的设备固件");
}

/// 打印设备登记结果。
pub(crate) fn print_device(record: &DeviceRecord) {
    print_title("设备已登记");
    print_field("deviceId", &record.device_id);
    print_field("networkId", &record.network_id.to_string());
    print_field("类型", &record.device_type);
    print_field("公钥", &record.public_key);
}

/// 打印管理员开通结果，含验证器链接。
pub(crate) fn print_admin(record: &AdminRecord) -> anyhow::Result<()> {
    let uri = totp::provisioning_uri(&record.username, &record.totp_secret)
        .map_err(anyhow::Error::msg)?;
    print_title("管理员已创建");
    print_field("用户名", &record.username);
    print_field("TOTP 密钥", &record.totp_secret);
    print_field("验证器链接", &uri);
    print_field("提示", "密钥只显示一次，请立即导入验证器");
    Ok(())
}

fn print_title(title: &str) {
    println!(
        "{cyan}{bold}\n== {title} =={reset}",
        cyan = ANSI_CYAN,
        bold = ANSI_BOLD,
        reset = ANSI_RESET
    );
}

fn print_field(label: &str, value: &str) {
    println!(
        "{white}{bold}{label}:{reset} {value}",
        white = ANSI_WHITE,
        bold = ANSI_BOLD,
        reset = ANSI_RESET
    );
}
