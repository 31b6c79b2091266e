//! 临时存储后端抽象接口

use crate::error::StoreError;
use async_trait::async_trait;

/// 临时存储后端
///
/// 所有键都带 TTL。实现必须保证 `take` 与 `incr_expire_if_new` 的原子性：
/// 前者保证挑战只能被消费一次，后者保证计数器不会出现没有过期时间的窗口。
#[async_trait]
pub trait EphemeralBackend: Send + Sync {
    /// 写入并设置过期时间，覆盖已有值
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// 仅当键不存在时写入
    ///
    /// # Returns
    /// * `Ok(true)` - 写入成功
    /// * `Ok(false)` - 键已存在
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 原子地读取并删除
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 原子地自增；若自增创建了该键（结果为 1），同时设置过期时间
    ///
    /// # Returns
    /// 自增后的值
    async fn incr_expire_if_new(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError>;

    /// 统计带指定前缀的未过期键
    async fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
