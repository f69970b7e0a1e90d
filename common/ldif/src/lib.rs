mod dn;
mod entry;
mod record;

// Distinguished names
pub use dn::normalize_value;
pub use dn::CaseIgnoreNormalizer;
pub use dn::Dn;
pub use dn::DnParseError;
pub use dn::ValueNormalizer;

// Entries
pub use entry::Attribute;
pub use entry::Entry;

// LDIF record codec
pub use record::write_entry;
pub use record::write_raw;
pub use record::RawRecord;
pub use record::RecordParseError;
pub use record::RecordReader;
