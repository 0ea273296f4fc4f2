pub mod concepts;
pub mod config;
pub mod error;
pub mod lookup;
pub mod table;

pub use config::{
    DataConfig, JoinMode, MappingStrategy, ResolutionConfig, SiteConfig, SourceFiles, TableConfig,
    UnmappedConcept,
};
pub use error::{ConfigError, Result};
pub use lookup::CaseInsensitiveSet;
pub use table::CdmTable;
