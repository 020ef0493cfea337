// Copyright (C) 2023 QuerentAI LLC.
// This file is part of Querent.

// The Licensed Work is licensed under the Business Source License 1.1 (BSL 1.1).
// You may use this file in compliance with the BSL 1.1, subject to the following restrictions:
// 1. You may not use the Licensed Work for AI-related services, database services,
//    or any service or product offering that provides database, big data, or analytics
//    services to third parties unless explicitly authorized by QuerentAI LLC.
// 2. For more details, see the LICENSE file or visit https://mariadb.com/bsl11/.

// For inquiries about alternative licensing arrangements, please contact contact@querent.xyz.

// The Licensed Work is provided "AS IS", WITHOUT WARRANTY OF ANY KIND, express or implied,
// including but not limited to the warranties of merchantability, fitness for a particular purpose,
// and non-infringement. See the Business Source License for more details.

// This software includes code developed by QuerentAI LLC (https://querent.xyz).

use common::ServiceErrorCode;
use hyper::StatusCode;
use serde::Serialize;
use warp::{reply::Response, Reply};

/// JSON body of every error answered by the REST server.
#[derive(Debug, Serialize)]
pub struct ApiError {
	#[serde(skip_serializing)]
	pub service_code: ServiceErrorCode,
	pub message: String,
}

impl ApiError {
	pub fn new(service_code: ServiceErrorCode, message: impl Into<String>) -> Self {
		Self { service_code, message: message.into() }
	}
}

impl Reply for ApiError {
	fn into_response(self) -> Response {
		let status_code = self.service_code.to_http_status_code();
		json_reply(&self, status_code)
	}
}

pub(crate) fn json_reply<T: Serialize>(value: &T, status_code: StatusCode) -> Response {
	warp::reply::with_status(warp::reply::json(value), status_code).into_response()
}
