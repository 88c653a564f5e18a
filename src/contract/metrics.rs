use crate::forms::{FormId, FormStatus};

/// Observer notified about form-level state changes. Metric export is out of
/// scope for the contract, so exporters plug in behind this interface; the
/// default observer drops everything.
pub trait ContractMetrics: Send + Sync {
    fn form_status(&self, _form_id: &FormId, _status: FormStatus) {}
    fn ballots_cast(&self, _form_id: &FormId, _count: usize) {}
    fn shuffle_instances(&self, _form_id: &FormId, _count: usize) {}
    fn pubshares_registered(&self, _form_id: &FormId, _count: usize) {}
}

#[derive(Debug, Default)]
pub struct NoopMetrics;

impl ContractMetrics for NoopMetrics {}

/// In-memory counters, used by tests to assert observer calls.
#[derive(Debug, Default)]
pub struct CountingMetrics {
    inner: parking_lot::Mutex<CountingState>,
}

#[derive(Debug, Default, Clone)]
pub struct CountingState {
    pub last_status: Option<(FormId, FormStatus)>,
    pub ballots: usize,
    pub shuffles: usize,
    pub pubshares: usize,
}

impl CountingMetrics {
    pub fn state(&self) -> CountingState {
        self.inner.lock().clone()
    }
}

impl ContractMetrics for CountingMetrics {
    fn form_status(&self, form_id: &FormId, status: FormStatus) {
        self.inner.lock().last_status = Some((*form_id, status));
    }

    fn ballots_cast(&self, _form_id: &FormId, count: usize) {
        self.inner.lock().ballots = count;
    }

    fn shuffle_instances(&self, _form_id: &FormId, count: usize) {
        self.inner.lock().shuffles = count;
    }

    fn pubshares_registered(&self, _form_id: &FormId, count: usize) {
        self.inner.lock().pubshares = count;
    }
}
