use std::collections::HashMap;

use crate::types::Vendor;

/// 按供应商保存密钥 构建后只读
///
/// 网关在调用时按解析出的 vendor 取密钥 缺失即 MissingCredential
/// 绝不静默降级为匿名调用
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    keys: HashMap<Vendor, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个供应商密钥 空白密钥视同未配置
    pub fn with_key(mut self, vendor: Vendor, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.keys.insert(vendor, key);
        }
        self
    }

    pub fn get(&self, vendor: Vendor) -> Option<&str> {
        self.keys.get(&vendor).map(String::as_str)
    }

    pub fn has(&self, vendor: Vendor) -> bool {
        self.keys.contains_key(&vendor)
    }
}

impl From<HashMap<Vendor, String>> for CredentialStore {
    fn from(keys: HashMap<Vendor, String>) -> Self {
        keys.into_iter()
            .fold(Self::new(), |store, (vendor, key)| store.with_key(vendor, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_keys_count_as_missing() {
        let store = CredentialStore::new()
            .with_key(Vendor::OpenAi, "sk-test")
            .with_key(Vendor::Anthropic, "   ");

        assert!(store.has(Vendor::OpenAi));
        assert!(!store.has(Vendor::Anthropic));
        assert_eq!(store.get(Vendor::OpenAi), Some("sk-test"));
        assert_eq!(store.get(Vendor::GoogleGemini), None);
    }
}
