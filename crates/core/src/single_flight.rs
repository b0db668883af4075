//! 按键 single-flight 填充协调
//!
//! 同一个键的并发 miss 只允许一次填充：第一个调用方登记一个
//! 填充回合并持有广播端，后来者克隆接收端等待结果。
//! 回合由独立任务驱动，任何单个等待者取消都不会中断填充

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tandem_errors::AppError;
use tokio::sync::watch;

/// 填充回合的结果，错误通过 Arc 共享给所有等待者
pub(crate) type EpisodeOutcome = Result<String, Arc<AppError>>;

type OutcomeReceiver = watch::Receiver<Option<EpisodeOutcome>>;
type Registry = Arc<Mutex<HashMap<String, OutcomeReceiver>>>;

/// 加入某个键的填充回合的结果
pub(crate) enum Flight {
    /// 当前调用方是该键的第一个 miss，负责发起填充
    Leader(Episode),
    /// 已有填充在途，等待其广播结果即可
    Follower(OutcomeReceiver),
}

/// 进程内在途填充登记表
#[derive(Default)]
pub(crate) struct FlightGroup {
    in_flight: Registry,
}

impl FlightGroup {
    /// 加入 key 的填充回合：无在途回合则登记为 leader，否则跟随
    pub(crate) fn join(&self, key: &str) -> Flight {
        let mut map = self.in_flight.lock();
        if let Some(rx) = map.get(key) {
            return Flight::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        map.insert(key.to_string(), rx);
        Flight::Leader(Episode {
            key: key.to_string(),
            tx,
            registry: Arc::clone(&self.in_flight),
            completed: false,
        })
    }

    /// 当前在途填充数
    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// 一次填充回合的广播端，由 leader 的填充任务持有
pub(crate) struct Episode {
    key: String,
    tx: watch::Sender<Option<EpisodeOutcome>>,
    registry: Registry,
    completed: bool,
}

impl Episode {
    /// 供 leader 调用方自己等待结果用的接收端
    pub(crate) fn subscribe(&self) -> OutcomeReceiver {
        self.tx.subscribe()
    }

    /// 撤销登记并广播结果
    ///
    /// 先撤销再广播：值此时已写入 L1，撤销后新来的调用方
    /// 复查 L1 即命中，不会错过结果
    pub(crate) fn complete(mut self, outcome: EpisodeOutcome) {
        self.registry.lock().remove(&self.key);
        let _ = self.tx.send(Some(outcome));
        self.completed = true;
    }
}

impl Drop for Episode {
    fn drop(&mut self) {
        // 填充任务未走到 complete 就被放弃时，撤销登记并广播错误，
        // 不让等待者悬挂
        if !self.completed {
            self.registry.lock().remove(&self.key);
            let _ = self
                .tx
                .send(Some(Err(Arc::new(AppError::internal(
                    "population episode aborted before completion",
                )))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_joiner_leads_rest_follow() {
        let group = FlightGroup::default();

        let Flight::Leader(episode) = group.join("k") else {
            panic!("first joiner must lead");
        };
        assert!(matches!(group.join("k"), Flight::Follower(_)));
        assert!(matches!(group.join("other"), Flight::Leader(_)));
        assert_eq!(group.in_flight_count(), 2);

        episode.complete(Ok("v".to_string()));
        assert_eq!(group.in_flight_count(), 1);
    }

    #[tokio::test]
    async fn test_followers_receive_broadcast_outcome() {
        let group = FlightGroup::default();

        let Flight::Leader(episode) = group.join("k") else {
            panic!("first joiner must lead");
        };
        let Flight::Follower(mut rx) = group.join("k") else {
            panic!("second joiner must follow");
        };

        episode.complete(Ok("v".to_string()));

        let outcome = rx.wait_for(Option::is_some).await.unwrap();
        assert_eq!(outcome.clone(), Some(Ok("v".to_string())));
    }

    #[tokio::test]
    async fn test_dropped_episode_unblocks_followers() {
        let group = FlightGroup::default();

        let Flight::Leader(episode) = group.join("k") else {
            panic!("first joiner must lead");
        };
        let Flight::Follower(mut rx) = group.join("k") else {
            panic!("second joiner must follow");
        };

        drop(episode);

        let outcome = rx.wait_for(Option::is_some).await.unwrap().clone();
        assert!(matches!(outcome, Some(Err(_))));
        // 登记也被撤销，下一个调用方可以重新发起填充
        assert_eq!(group.in_flight_count(), 0);
        assert!(matches!(group.join("k"), Flight::Leader(_)));
    }
}
