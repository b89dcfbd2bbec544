use super::device::DeviceType;
use super::registry::Registry;

/// Result of one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Average {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub contributors: usize,
}

/// Recompute the outdoor average and store it on the aggregate device.
///
/// Every outdoor device except the aggregate itself contributes the readings
/// it has. A reading with no contributors leaves the aggregate's previous
/// value in place. Returns `None` when there is no aggregate device.
pub fn recompute(registry: &mut Registry) -> Option<Average> {
    let key = registry.aggregate_key()?;

    let mut temperature = Mean::default();
    let mut humidity = Mean::default();
    let mut contributors = 0;
    for record in registry
        .records_where(|r| r.device_type() == DeviceType::Outdoor && !r.is_aggregate())
    {
        temperature.add(record.temperature);
        humidity.add(record.humidity);
        if record.temperature.is_some() || record.humidity.is_some() {
            contributors += 1;
        }
    }

    let average = Average {
        temperature: temperature.value(),
        humidity: humidity.value(),
        contributors,
    };

    let aggregate = registry.get_mut(&key).ok()?;
    if let Some(t) = average.temperature {
        aggregate.temperature = Some(t);
    }
    if let Some(h) = average.humidity {
        aggregate.humidity = Some(h);
    }
    Some(average)
}

#[derive(Debug, Default)]
struct Mean {
    sum: f64,
    count: u32,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}
