//! CSV report writers held by a `Context`.
//!
//! A report is a `Serialize` struct marked with `define_report!`; each value sent becomes
//! one CSV row in the file registered for that type with `add_report`. Output files are
//! named `{directory}/{file_prefix}{short_name}.csv`.
use crate::context::Context;
use crate::define_data_plugin;
use crate::error::BranchingError;
use crate::log::{error, trace};
use crate::{HashMap, HashMapExt};
use csv::Writer;
use std::any::TypeId;
use std::cell::RefCell;
use std::fs::{create_dir_all, File};
use std::path::PathBuf;

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), csv::Error>;
}

/// Use this macro to define a unique report type
#[macro_export]
macro_rules! define_report {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(
                &self,
                writer: &mut $crate::csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::csv::Error> {
                writer.serialize(self)
            }
        }
    };
}
pub use define_report;

/// Where and how report files are written.
#[derive(Debug, Clone)]
pub struct ConfigReportOptions {
    pub file_prefix: String,
    pub directory: PathBuf,
    pub overwrite: bool,
}

impl ConfigReportOptions {
    #[must_use]
    pub fn new() -> Self {
        trace!("new ConfigReportOptions");
        // Sets the defaults
        ConfigReportOptions {
            file_prefix: String::new(),
            directory: PathBuf::from("."),
            overwrite: false,
        }
    }

    /// Sets the file prefix option (e.g., "run1_")
    pub fn file_prefix(&mut self, file_prefix: String) -> &mut ConfigReportOptions {
        trace!("setting report prefix to {file_prefix}");
        self.file_prefix = file_prefix;
        self
    }

    /// Sets the directory where reports will be output
    pub fn directory(&mut self, directory: PathBuf) -> &mut ConfigReportOptions {
        trace!("setting report directory to {directory:?}");
        self.directory = directory;
        self
    }

    /// Sets whether to overwrite existing reports of the same name if they exist
    pub fn overwrite(&mut self, overwrite: bool) -> &mut ConfigReportOptions {
        trace!("setting report overwrite {overwrite}");
        self.overwrite = overwrite;
        self
    }

    /// The bare file name a report with this short name is written to.
    #[must_use]
    pub fn file_name(&self, short_name: &str) -> String {
        format!("{}{short_name}.csv", self.file_prefix)
    }

    /// The full path a report with this short name is written to.
    #[must_use]
    pub fn file_path(&self, short_name: &str) -> PathBuf {
        self.directory.join(self.file_name(short_name))
    }
}

impl Default for ConfigReportOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct ReportData {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
    config: ConfigReportOptions,
}

// Registers a data container that stores
// * file_writers: Maps report type to file writer
// * config: Contains all the customizable filename options that the user supplies
define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(HashMap::new()),
        config: ConfigReportOptions::new(),
    }
);

pub trait ContextReportExt {
    /// Opens the CSV file for report type `T` named after `short_name` and the current
    /// report options. Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns a `BranchingError` if the file already exists and overwriting is off, or if
    /// the file cannot be created.
    fn add_report<T: Report + 'static>(&mut self, short_name: &str) -> Result<(), BranchingError>;

    /// True if a writer has been registered for report type `T`.
    fn has_report<T: Report + 'static>(&self) -> bool;

    /// Write a new row with columns following items in the report struct
    /// to the report file associated with the report type struct.
    ///
    /// # Panics
    ///
    /// Panics if no report of this type has been added.
    fn send_report<T: Report>(&self, report: T);

    /// Flushes every open report file.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error encountered.
    fn flush_reports(&self) -> Result<(), BranchingError>;

    fn report_options(&mut self) -> &mut ConfigReportOptions;
}

impl ContextReportExt for Context {
    fn add_report<T: Report + 'static>(&mut self, short_name: &str) -> Result<(), BranchingError> {
        trace!("adding report {short_name}");
        let data_container = self.get_data_mut(ReportPlugin);
        let path = data_container.config.file_path(short_name);

        if path.exists() && !data_container.config.overwrite {
            return Err(BranchingError::ReportError(format!(
                "file already exists: {}. Please set `overwrite` to true in the file configuration and rerun.",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let writer = Writer::from_writer(file);
        data_container
            .file_writers
            .get_mut()
            .insert(TypeId::of::<T>(), writer);
        Ok(())
    }

    fn has_report<T: Report + 'static>(&self) -> bool {
        self.get_data(ReportPlugin)
            .file_writers
            .borrow()
            .contains_key(&TypeId::of::<T>())
    }

    fn send_report<T: Report>(&self, report: T) {
        let data_container = self.get_data(ReportPlugin);
        let mut writer_cell = data_container.file_writers.borrow_mut();
        let writer = writer_cell
            .get_mut(&report.type_id())
            .expect("No writer found for the report type");
        if let Err(e) = report.serialize(writer) {
            error!("failed to write report row: {e}");
        }
    }

    fn flush_reports(&self) -> Result<(), BranchingError> {
        let data_container = self.get_data(ReportPlugin);
        for writer in data_container.file_writers.borrow_mut().values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn report_options(&mut self) -> &mut ConfigReportOptions {
        let data_container = self.get_data_mut(ReportPlugin);
        &mut data_container.config
    }
}
