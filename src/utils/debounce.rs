use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// 可取消的延迟回调，每次触发都会重新计时
///
/// 计时结束后动作在独立任务中执行，之后的触发不会取消已经发出的请求。
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    /// 当前计时任务及其代号
    timer: Arc<Mutex<Option<(u64, JoinHandle<()>)>>>,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timer: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// 重新开始计时；之前尚未触发的动作被丢弃
    pub fn trigger<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = self.timer.clone();
        let mut slot = self.timer.lock();
        if let Some((_, previous)) = slot.take() {
            previous.abort();
            debug!("Debounce timer restarted");
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = timer.lock();
                // 计时期间已被新的触发取代
                if !matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
                    return;
                }
                slot.take();
            }
            tokio::spawn(action());
        });
        *slot = Some((generation, handle));
    }

    /// 取消尚未触发的动作
    pub fn cancel(&self) -> bool {
        match self.timer.lock().take() {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .map(|(_, handle)| !handle.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_only_last_trigger_fires() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let fired = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));

        for i in 1..=3 {
            let fired = fired.clone();
            let last = last.clone();
            debouncer.trigger(move || async move {
                fired.fetch_add(1, Ordering::SeqCst);
                last.store(i, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(debouncer.is_pending());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        debouncer.trigger(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(debouncer.cancel());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!debouncer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_does_not_cancel_running_action() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let finished = Arc::new(AtomicUsize::new(0));

        let counter = finished.clone();
        debouncer.trigger(move || async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(400)).await;

        // 第一次动作已在执行，再次触发只重新计时
        debouncer.trigger(|| async {});
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retrigger_at_expiry_keeps_new_timer() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..25 {
            let counter = fired.clone();
            debouncer.trigger(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(20)).await;

            // 恰好在计时结束附近重新触发，新的计时必须仍可见
            let counter = fired.clone();
            debouncer.trigger(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert!(debouncer.is_pending());
            assert!(debouncer.cancel());
            assert!(!debouncer.is_pending());
        }
        // 每轮最多只有第一次计时真正触发
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fired.load(Ordering::SeqCst) <= 25);
    }
}
