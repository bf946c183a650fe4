use std::sync::atomic::{AtomicBool, Ordering};

/// Token bucket built on a tokio semaphore; every permit is one byte.
pub struct Semaphore {
    flag: AtomicBool,
    sem: tokio::sync::Semaphore,
}

impl Semaphore {
    pub fn new(value: usize) -> Self {
        let sem = tokio::sync::Semaphore::new(0);
        let semaphore = Self {
            flag: AtomicBool::new(false),
            sem,
        };
        semaphore.setup(value);
        semaphore
    }

    pub fn setup(&self, value: usize) {
        self.flag.store(value > 0, Ordering::Release);
        if value == 0 {
            return;
        }
        self.sem.forget_permits(self.sem.available_permits());
        self.sem.add_permits(value);
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }

    pub async fn consume_many(&self, value: u32) -> Result<(), tokio::sync::AcquireError> {
        if self.flag.load(Ordering::Acquire) && value > 0 {
            self.sem.acquire_many(value).await?.forget();
        }
        Ok(())
    }

    pub async fn run_replenish_thread(&self, replenish: usize, interval: std::time::Duration) {
        if !self.flag.load(Ordering::Acquire) {
            return;
        }
        loop {
            tokio::time::sleep(interval).await;
            let curr_permits = self.sem.available_permits();
            if curr_permits >= replenish {
                continue;
            }
            self.sem.add_permits(replenish - curr_permits);
        }
    }
}
