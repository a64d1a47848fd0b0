/*
 * Responsibility
 * - Public interface of the middleware layer
 * - http: transport concerns, oauth2: the admission gate
 */
pub mod http;
pub mod oauth2;
