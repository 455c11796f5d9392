mod dns_service;

pub use dns_service::DnsService;
