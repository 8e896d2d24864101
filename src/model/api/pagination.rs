use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Page selection from the `page` and `limit` query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u64,
    limit: u64,
}

impl Pagination {
    /// Validate a page request: pages count from 1, and `limit` is between 1 and [`MAX_PAGE_SIZE`].
    ///
    /// Pages whose offset does not fit in a database skip (`i64`) are rejected.
    pub fn new(page: Option<u64>, limit: Option<u64>) -> Result<Self, Error> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(Error::bad_request("Invalid page number"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::bad_request(format!(
                "Invalid limit value. Must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        match (page - 1).checked_mul(limit) {
            Some(skip) if skip <= i64::MAX as u64 => Ok(Self { page, limit }),
            _ => Err(Error::bad_request("Invalid page number")),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of items before this page.
    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.limit
    }

    /// Wrap one page of items, given the total across all pages.
    pub fn to_paginated<T>(self, total: u64, items: Vec<T>) -> Paginated<T> {
        Paginated {
            items,
            pagination: PageInfo {
                page: self.page,
                limit: self.limit,
                total,
                total_pages: (total + self.limit - 1) / self.limit,
            },
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Pagination {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let page = match req.query_value::<u64>("page").transpose() {
            Ok(page) => page,
            Err(_) => {
                let err = Error::bad_request("Invalid page number");
                return request::Outcome::Failure((Status::BadRequest, err));
            }
        };
        let limit = match req.query_value::<u64>("limit").transpose() {
            Ok(limit) => limit,
            Err(_) => {
                let err = Error::bad_request("Invalid limit value");
                return request::Outcome::Failure((Status::BadRequest, err));
            }
        };
        match Self::new(page, limit) {
            Ok(pagination) => request::Outcome::Success(pagination),
            Err(err) => request::Outcome::Failure((Status::BadRequest, err)),
        }
    }
}

/// Page metadata returned alongside paginated items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}
