use std::{str::FromStr, sync::LazyLock};

const DEFAULT_VALUES: [i64; 2] = [2, 3];
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_CAPACITY: usize = 0;

pub struct DemoConfig {
    values: Vec<i64>,
    workers: usize,
    capacity: usize,
}

impl DemoConfig {
    pub fn new(values: Vec<i64>, workers: usize, capacity: usize) -> Self {
        Self {
            values,
            workers,
            capacity,
        }
    }

    fn from_env() -> Self {
        let values = env_or("PIPE_DEMO_VALUES", DEFAULT_VALUES.to_vec(), parse_values);
        let workers = env_or("PIPE_DEMO_WORKERS", DEFAULT_WORKERS, |s| {
            s.parse::<usize>().ok().filter(|n| *n > 0)
        });
        let capacity = env_or("PIPE_DEMO_CAPACITY", DEFAULT_CAPACITY, |s| {
            usize::from_str(s).ok()
        });
        Self::new(values, workers, capacity)
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub fn config() -> &'static DemoConfig {
    static CONFIG: LazyLock<DemoConfig> = LazyLock::new(DemoConfig::from_env);
    &CONFIG
}

fn env_or<T>(key: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match parse(raw.trim()) {
        Some(value) => value,
        None => {
            log::warn!("ignoring invalid {}={:?}, using default", key, raw);
            default
        }
    }
}

fn parse_values(s: &str) -> Option<Vec<i64>> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| part.trim().parse::<i64>().ok())
        .collect()
}
