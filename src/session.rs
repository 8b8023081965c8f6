use std::sync::Arc;

use crate::domain::validation::ValueValidator;
use crate::infra::export::csv::ExportOptions;
use crate::settings::SessionSettings;
use crate::usecase::ports::layer::{MapNotifier, NoopNotifier, RowSource};
use crate::usecase::services::row_pager::RowPager;
use crate::usecase::services::transaction_coordinator::{LayerLocks, TransactionCoordinator};

/// State shared by every attribute-table view of one editing session.
pub struct AppSession {
    settings: SessionSettings,
    locks: Arc<LayerLocks>,
    notifier: Arc<dyn MapNotifier>,
}

impl AppSession {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            locks: Arc::new(LayerLocks::new()),
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn MapNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SessionSettings {
        &mut self.settings
    }

    /// Coordinators from one session share layer locks.
    pub fn coordinator(&self) -> TransactionCoordinator {
        TransactionCoordinator::new(
            self.locks.clone(),
            ValueValidator::new(self.settings.validation),
            self.notifier.clone(),
        )
    }

    pub fn row_pager(&self, source: Arc<dyn RowSource>) -> RowPager {
        RowPager::new(source, self.settings.page_size)
    }

    pub fn export_options(&self, projection_wkt: Option<String>) -> ExportOptions {
        ExportOptions {
            code_page: self.settings.export_code_page,
            projection_wkt,
        }
    }
}

impl Default for AppSession {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}
