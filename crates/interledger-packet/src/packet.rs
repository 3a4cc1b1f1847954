use crate::{Address, ErrorCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str;
use std::time::SystemTime;

#[derive(PartialEq, Clone)]
pub struct Prepare {
    destination: Address,
    amount: u64,
    expires_at: SystemTime,
    execution_condition: [u8; 32],
    data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrepareBuilder<'a> {
    pub amount: u64,
    pub expires_at: SystemTime,
    pub execution_condition: &'a [u8; 32],
    pub destination: Address,
    pub data: &'a [u8],
}

impl Prepare {
    #[inline]
    pub fn amount(&self) -> u64 {
        self.amount
    }

    #[inline]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    #[inline]
    pub fn execution_condition(&self) -> &[u8] {
        &self.execution_condition[..]
    }

    #[inline]
    pub fn destination(&self) -> &Address {
        &self.destination
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl fmt::Debug for Prepare {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Prepare")
            .field("destination", &self.destination)
            .field("amount", &self.amount)
            .field(
                "expires_at",
                &DateTime::<Utc>::from(self.expires_at).to_rfc3339(),
            )
            .field(
                "execution_condition",
                &hex::encode(self.execution_condition),
            )
            .field("data_length", &self.data.len())
            .finish()
    }
}

impl<'a> PrepareBuilder<'a> {
    pub fn build(&self) -> Prepare {
        Prepare {
            destination: self.destination.clone(),
            amount: self.amount,
            expires_at: self.expires_at,
            execution_condition: *self.execution_condition,
            data: Bytes::copy_from_slice(self.data),
        }
    }
}

#[derive(PartialEq, Clone)]
pub struct Fulfill {
    fulfillment: [u8; 32],
    data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FulfillBuilder<'a> {
    pub fulfillment: &'a [u8; 32],
    pub data: &'a [u8],
}

impl Fulfill {
    #[inline]
    pub fn fulfillment(&self) -> &[u8] {
        &self.fulfillment[..]
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl fmt::Debug for Fulfill {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Fulfill")
            .field("fulfillment", &hex::encode(self.fulfillment))
            .field("data_length", &self.data.len())
            .finish()
    }
}

impl<'a> FulfillBuilder<'a> {
    pub fn build(&self) -> Fulfill {
        Fulfill {
            fulfillment: *self.fulfillment,
            data: Bytes::copy_from_slice(self.data),
        }
    }
}

#[derive(PartialEq, Clone)]
pub struct Reject {
    code: ErrorCode,
    message: Bytes,
    triggered_by: Option<Address>,
    data: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RejectBuilder<'a> {
    pub code: ErrorCode,
    pub message: &'a [u8],
    pub triggered_by: Option<&'a Address>,
    pub data: &'a [u8],
}

impl Reject {
    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    #[inline]
    pub fn triggered_by(&self) -> Option<&Address> {
        self.triggered_by.as_ref()
    }

    #[inline]
    pub fn message(&self) -> &[u8] {
        self.message.as_ref()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl fmt::Debug for Reject {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Reject")
            .field("code", &self.code)
            .field(
                "message",
                &str::from_utf8(&self.message).unwrap_or("<not utf8>"),
            )
            .field("triggered_by", &self.triggered_by)
            .field("data_length", &self.data.len())
            .finish()
    }
}

impl<'a> RejectBuilder<'a> {
    pub fn build(&self) -> Reject {
        Reject {
            code: self.code,
            message: Bytes::copy_from_slice(self.message),
            triggered_by: self.triggered_by.cloned(),
            data: Bytes::copy_from_slice(self.data),
        }
    }
}
