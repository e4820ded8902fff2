//! Azure DNS: zones and the record sets inside them

mod record_set;
mod zone;

pub use record_set::{DnsRecordSet, MxRecord, RecordType, Records, SrvRecord};
pub use zone::{DnsZone, ZoneRef};
