use std::fmt;

use actix_web::{web, Route};
use log::*;
use serde::{Deserialize, Serialize};

use infra::persistence::Store;

use super::{
    Catalog, ListDrinks, ListGlasses, ListIngredients, ShowDrink, ShowGlass, ShowIngredient,
};
use crate::error::Error;
use crate::services::{Queryable, Request};

#[derive(Debug, Deserialize)]
struct NameParam {
    name: Option<String>,
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Store + Send + 'static> Catalog<M> {
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(
            web::QueryConfig::default()
                .error_handler(|err, _req| Error::BadRequest(err.to_string()).into()),
        )
        .service(web::resource("/drinks").route(self.listing(|name| ListDrinks { name })))
            .service(web::resource("/drinks/{name}").route(self.detail(|name| ShowDrink { name })))
            .service(
                web::resource("/ingredients")
                    .route(self.listing(|name| ListIngredients { name })),
            )
            .service(
                web::resource("/ingredients/{name}")
                    .route(self.detail(|name| ShowIngredient { name })),
            )
            .service(web::resource("/glasses").route(self.listing(|name| ListGlasses { name })))
            .service(
                web::resource("/glasses/{name}").route(self.detail(|name| ShowGlass { name })),
            );
    }

    /// `GET` with an optional `?name=` substring filter.
    fn listing<Req>(&self, request: fn(Option<String>) -> Req) -> Route
    where
        Self: Queryable<Req>,
        Req: Request + fmt::Debug + Send + 'static,
        Req::Resp: Serialize + Send + 'static,
    {
        let me = self.clone();
        web::get().to(move |param: web::Query<NameParam>| {
            let name = param.into_inner().name.filter(|n| !n.is_empty());
            me.clone().respond(request(name))
        })
    }

    /// `GET` on a single record named by the last path segment.
    fn detail<Req>(&self, request: fn(String) -> Req) -> Route
    where
        Self: Queryable<Req>,
        Req: Request + fmt::Debug + Send + 'static,
        Req::Resp: Serialize + Send + 'static,
    {
        let me = self.clone();
        web::get().to(move |name: web::Path<String>| me.clone().respond(request(name.into_inner())))
    }

    async fn respond<Req>(self, req: Req) -> Result<web::Json<Req::Resp>, Error>
    where
        Self: Queryable<Req>,
        Req: Request + fmt::Debug + Send + 'static,
        Req::Resp: Serialize + Send + 'static,
    {
        info!("Handle {:?}", req);
        let resp = web::block(move || self.query(req))
            .await
            .map_err(|e| Error::Unhandled(anyhow::anyhow!("blocking task failed: {}", e)))??;
        Ok(web::Json(resp))
    }
}
