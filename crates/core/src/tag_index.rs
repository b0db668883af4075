//! 标签双向索引
//!
//! tag -> keys 与 key -> tags 两张映射作为一个整体维护，
//! 纯进程内数据结构，按字符串值索引，不持有缓存条目本身

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct IndexMaps {
    tag_to_keys: HashMap<String, HashSet<String>>,
    key_to_tags: HashMap<String, HashSet<String>>,
}

/// 标签双向索引
///
/// 不变式：任意 (tag, key) 对在两张映射中同时存在或同时不存在；
/// 删除后不留空的标签集合。索引随进程启动从零重建，不做持久化，
/// 只覆盖当前进程填充过的键
#[derive(Debug, Default)]
pub struct TagIndex {
    inner: RwLock<IndexMaps>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建立 key 与一组标签的关联，幂等
    pub fn associate(&self, key: &str, tags: &[String]) {
        if tags.is_empty() {
            return;
        }
        let mut maps = self.inner.write();
        for tag in tags {
            maps.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        maps.key_to_tags
            .entry(key.to_string())
            .or_default()
            .extend(tags.iter().cloned());
    }

    /// 解除 key 的全部标签关联
    ///
    /// 通过反向映射定位所属标签集合，变空的标签立即剪除。
    /// 只在删除缓存条目的路径上调用，且先于条目清理
    pub fn dissociate(&self, key: &str) {
        let mut maps = self.inner.write();
        let Some(tags) = maps.key_to_tags.remove(key) else {
            return;
        };
        for tag in &tags {
            if let Some(keys) = maps.tag_to_keys.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    maps.tag_to_keys.remove(tag);
                }
            }
        }
    }

    /// 某个标签下的键集合快照
    ///
    /// 返回副本，调用方迭代期间的并发修改不影响快照
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.inner
            .read()
            .tag_to_keys
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// 多个标签下键集合的并集快照，重复键只出现一次
    pub fn keys_for_tags(&self, tags: &[String]) -> HashSet<String> {
        let maps = self.inner.read();
        let mut keys = HashSet::new();
        for tag in tags {
            if let Some(tagged) = maps.tag_to_keys.get(tag) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys
    }

    /// 某个键的标签集合快照
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.inner
            .read()
            .key_to_tags
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// 当前有键关联的标签数
    pub fn tag_count(&self) -> usize {
        self.inner.read().tag_to_keys.len()
    }

    /// 当前有标签关联的键数
    pub fn key_count(&self) -> usize {
        self.inner.read().key_to_tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().key_to_tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_associate_is_bidirectional() {
        let index = TagIndex::new();
        index.associate("k1", &tags(&["a", "b"]));

        assert!(index.keys_for_tag("a").contains("k1"));
        assert!(index.keys_for_tag("b").contains("k1"));
        assert_eq!(index.tags_for_key("k1"), tags(&["a", "b"]).into_iter().collect());
    }

    #[test]
    fn test_associate_is_idempotent() {
        let index = TagIndex::new();
        index.associate("k1", &tags(&["a"]));
        index.associate("k1", &tags(&["a"]));

        assert_eq!(index.keys_for_tag("a").len(), 1);
        assert_eq!(index.tags_for_key("k1").len(), 1);
    }

    #[test]
    fn test_dissociate_prunes_empty_tags() {
        let index = TagIndex::new();
        index.associate("k1", &tags(&["a", "b"]));
        index.associate("k2", &tags(&["b"]));

        index.dissociate("k1");

        // a 变空被剪除，b 仍保留 k2
        assert_eq!(index.tag_count(), 1);
        assert!(index.keys_for_tag("a").is_empty());
        assert_eq!(index.keys_for_tag("b").len(), 1);
        assert!(index.tags_for_key("k1").is_empty());
    }

    #[test]
    fn test_dissociate_absent_key_is_noop() {
        let index = TagIndex::new();
        index.associate("k1", &tags(&["a"]));

        index.dissociate("missing");
        index.dissociate("missing");

        assert_eq!(index.key_count(), 1);
        assert_eq!(index.tag_count(), 1);
    }

    #[test]
    fn test_keys_for_tags_union_collapses_duplicates() {
        let index = TagIndex::new();
        index.associate("k1", &tags(&["a"]));
        index.associate("k2", &tags(&["b"]));
        index.associate("k3", &tags(&["a", "b"]));

        let union = index.keys_for_tags(&tags(&["a", "b"]));
        assert_eq!(union.len(), 3);
        assert!(union.contains("k1") && union.contains("k2") && union.contains("k3"));
    }

    #[test]
    fn test_unknown_tag_queries_empty() {
        let index = TagIndex::new();
        assert!(index.keys_for_tag("never-used").is_empty());
        assert!(index.keys_for_tags(&tags(&["x", "y"])).is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_from_live_index() {
        let index = TagIndex::new();
        index.associate("k1", &tags(&["a"]));

        let snapshot = index.keys_for_tag("a");
        index.dissociate("k1");

        // 快照不受后续修改影响
        assert!(snapshot.contains("k1"));
        assert!(index.keys_for_tag("a").is_empty());
    }
}
