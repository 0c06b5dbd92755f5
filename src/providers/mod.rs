pub mod gateway;
pub(crate) mod gateway_translate;
pub mod in_process;
pub(crate) mod translator_contract;
