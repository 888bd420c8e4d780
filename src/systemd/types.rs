/// Service state as seen through the service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No usable service manager (systemctl missing or no user bus).
    NotAvailable,
    NotLoaded,
    Active,
    Inactive,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::NotAvailable => "not-available",
            ServiceState::NotLoaded => "unit-not-loaded",
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            ServiceAction::Start => "started",
            ServiceAction::Stop => "stopped",
        }
    }
}
