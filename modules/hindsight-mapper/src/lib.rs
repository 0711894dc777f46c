pub mod mapper;
pub mod model;
pub mod rate_limit;
pub mod sources;

pub use mapper::{Mapper, MapperConfig};
pub use model::{DiscoveredUrl, DomainMap, MapFilters, SourceDetails};
pub use sources::subdomains::{CrtShProvider, SubdomainProvider};
