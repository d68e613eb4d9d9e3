use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 播放时钟 - 视频帧选择和位置上报的时间基准
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    base_pts: i64,              // 基准 PTS（毫秒）
    base_instant: Instant,      // 基准时刻
    paused: bool,
    paused_at: i64,             // 暂停时的位置
}

impl ClockInner {
    fn now(&self) -> i64 {
        if self.paused {
            self.paused_at
        } else {
            self.base_pts + self.base_instant.elapsed().as_millis() as i64
        }
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                base_pts: 0,
                base_instant: Instant::now(),
                paused: true,
                paused_at: 0,
            })),
        }
    }

    /// 获取当前播放时间（毫秒）
    pub fn now(&self) -> i64 {
        self.inner.lock().now()
    }

    /// 设置播放位置（保持暂停/播放状态不变）
    pub fn set_time(&self, pts: i64) {
        let mut inner = self.inner.lock();
        inner.base_pts = pts;
        inner.base_instant = Instant::now();
        inner.paused_at = pts;
    }

    pub fn play(&self) {
        let mut inner = self.inner.lock();
        if inner.paused {
            inner.base_pts = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
    }

    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.paused_at = inner.now();
            inner.paused = true;
        }
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
