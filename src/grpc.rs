// vermon: gRPC protocol surface (the `grpc` SERVER_TYPE) - cart service proxy
//
// The message and service glue below is a hand-written mirror of the cart
// slice of the shop's demo.proto, shaped like tonic's generated code. Writing
// it out keeps protoc out of the build entirely.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tonic::transport::{Channel, Endpoint, Server};
use tonic::{Request, Response, Status};
use tracing::info;

use crate::core::{Core, RESPONSE_VERIFIER};
use crate::error::{GatewayError, GatewayResult};
use crate::event::{self, Event};
use crate::preprocessor::round3;

/// The downstream service key used for gRPC cart metrics.
const CART_SERVICE: &str = "cart_service";

pub mod proto {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CartItem {
        #[prost(string, tag = "1")]
        pub product_id: ::prost::alloc::string::String,
        #[prost(int32, tag = "2")]
        pub quantity: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AddItemRequest {
        #[prost(string, tag = "1")]
        pub user_id: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "2")]
        pub item: ::core::option::Option<CartItem>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetCartRequest {
        #[prost(string, tag = "1")]
        pub user_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EmptyCartRequest {
        #[prost(string, tag = "1")]
        pub user_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Cart {
        #[prost(string, tag = "1")]
        pub user_id: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "2")]
        pub items: ::prost::alloc::vec::Vec<CartItem>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Empty {}
}

/// Cart service contract, mirrored from the shop's proto.
#[tonic::async_trait]
pub trait CartService: Send + Sync + 'static {
    async fn add_item(
        &self,
        request: Request<proto::AddItemRequest>,
    ) -> Result<Response<proto::Empty>, Status>;

    async fn get_cart(
        &self,
        request: Request<proto::GetCartRequest>,
    ) -> Result<Response<proto::Cart>, Status>;

    async fn empty_cart(
        &self,
        request: Request<proto::EmptyCartRequest>,
    ) -> Result<Response<proto::Empty>, Status>;
}

/// Minimal unary client over a connected channel.
pub struct CartServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl Clone for CartServiceClient {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl CartServiceClient {
    pub async fn connect(dst: String) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(dst)?.connect().await?;
        Ok(Self {
            inner: tonic::client::Grpc::new(channel),
        })
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("cart service not ready: {e}")))
    }

    pub async fn add_item(
        &mut self,
        request: proto::AddItemRequest,
    ) -> Result<Response<proto::Empty>, Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path =
            tonic::codegen::http::uri::PathAndQuery::from_static("/hipstershop.CartService/AddItem");
        self.inner.unary(Request::new(request), path, codec).await
    }

    pub async fn get_cart(
        &mut self,
        request: proto::GetCartRequest,
    ) -> Result<Response<proto::Cart>, Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path =
            tonic::codegen::http::uri::PathAndQuery::from_static("/hipstershop.CartService/GetCart");
        self.inner.unary(Request::new(request), path, codec).await
    }

    pub async fn empty_cart(
        &mut self,
        request: proto::EmptyCartRequest,
    ) -> Result<Response<proto::Empty>, Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = tonic::codegen::http::uri::PathAndQuery::from_static(
            "/hipstershop.CartService/EmptyCart",
        );
        self.inner.unary(Request::new(request), path, codec).await
    }
}

/// Forwards cart RPCs to the real cart service, measuring and observing each
/// interaction through the same core the HTTP surface uses.
pub struct CartProxy {
    core: Arc<Core>,
    client: CartServiceClient,
}

impl CartProxy {
    async fn record(&self, op: &str, user: &str, latency_ms: f64, ok: bool) {
        let ts = event::now_ts();
        {
            let mut metrics = self.core.metrics.lock();
            if ok {
                metrics.record_latency(CART_SERVICE, latency_ms);
            } else {
                metrics.record_failure(CART_SERVICE);
            }
        }
        if ok {
            self.core
                .submit_objective_fact(
                    RESPONSE_VERIFIER,
                    ts,
                    format!(
                        "responsetime({}, {})",
                        self.core.config.host_id,
                        round3(latency_ms)
                    ),
                )
                .await;
        }
        self.core
            .observe(Event::CartOp {
                user: user.to_string(),
                op: op.to_string(),
                status: if ok { 200 } else { 500 },
                ts,
            })
            .await;
    }
}

#[tonic::async_trait]
impl CartService for CartProxy {
    async fn add_item(
        &self,
        request: Request<proto::AddItemRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let message = request.into_inner();
        let user = message.user_id.clone();
        let item = message.item.as_ref().map(|i| i.product_id.clone());

        let started = Instant::now();
        let result = self.client.clone().add_item(message).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.record("AddItem", &user, latency_ms, result.is_ok()).await;
        if result.is_ok() {
            if let Some(item) = item {
                self.core
                    .observe(Event::AddItem {
                        user,
                        session: None,
                        item,
                        ts: event::now_ts(),
                    })
                    .await;
            }
        }
        result
    }

    async fn get_cart(
        &self,
        request: Request<proto::GetCartRequest>,
    ) -> Result<Response<proto::Cart>, Status> {
        let message = request.into_inner();
        let user = message.user_id.clone();

        let started = Instant::now();
        let result = self.client.clone().get_cart(message).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.record("GetCart", &user, latency_ms, result.is_ok()).await;
        if let Ok(response) = &result {
            let cart = response
                .get_ref()
                .items
                .iter()
                .map(|i| i.product_id.clone())
                .collect();
            self.core
                .observe(Event::GetCart {
                    user,
                    session: None,
                    cart,
                    ts: event::now_ts(),
                })
                .await;
        }
        result
    }

    async fn empty_cart(
        &self,
        request: Request<proto::EmptyCartRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let message = request.into_inner();
        let user = message.user_id.clone();

        let started = Instant::now();
        let result = self.client.clone().empty_cart(message).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.record("EmptyCart", &user, latency_ms, result.is_ok()).await;
        if result.is_ok() {
            self.core
                .observe(Event::EmptyCart {
                    user,
                    ts: event::now_ts(),
                })
                .await;
        }
        result
    }
}

/// Serve the cart proxy on the configured port.
pub async fn serve(core: Arc<Core>) -> GatewayResult<()> {
    let addr = format!("0.0.0.0:{}", core.config.port)
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid bind address: {e}")))?;
    let backend = core
        .config
        .cart_service_addr
        .clone()
        .ok_or_else(|| GatewayError::Config("CART_SERVICE_ADDR is not set".to_string()))?;
    let backend = if backend.starts_with("http://") || backend.starts_with("https://") {
        backend
    } else {
        format!("http://{backend}")
    };

    let client = CartServiceClient::connect(backend.clone())
        .await
        .map_err(|e| GatewayError::Config(format!("failed to reach cart service: {e}")))?;
    info!(%addr, %backend, "grpc cart proxy listening");

    let proxy = CartProxy {
        core: Arc::clone(&core),
        client,
    };
    Server::builder()
        .add_service(server::CartServiceServer::new(proxy))
        .serve(addr)
        .await
        .map_err(|e| GatewayError::Config(format!("grpc server error: {e}")))?;
    Ok(())
}

/// Server glue in the shape tonic's codegen produces for a three-RPC service.
pub mod server {
    use super::{proto, CartService};
    use tonic::codegen::*;

    pub struct CartServiceServer<T: CartService> {
        inner: Arc<T>,
    }

    impl<T: CartService> CartServiceServer<T> {
        pub fn new(inner: T) -> Self {
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    impl<T: CartService> Clone for CartServiceServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for CartServiceServer<T>
    where
        T: CartService,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = Arc::clone(&self.inner);
            match req.uri().path() {
                "/hipstershop.CartService/AddItem" => {
                    struct AddItemSvc<T: CartService>(Arc<T>);
                    impl<T: CartService> tonic::server::UnaryService<proto::AddItemRequest> for AddItemSvc<T> {
                        type Response = proto::Empty;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<proto::AddItemRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.add_item(request).await })
                        }
                    }
                    Box::pin(async move {
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        Ok(grpc.unary(AddItemSvc(inner), req).await)
                    })
                }
                "/hipstershop.CartService/GetCart" => {
                    struct GetCartSvc<T: CartService>(Arc<T>);
                    impl<T: CartService> tonic::server::UnaryService<proto::GetCartRequest> for GetCartSvc<T> {
                        type Response = proto::Cart;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<proto::GetCartRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.get_cart(request).await })
                        }
                    }
                    Box::pin(async move {
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        Ok(grpc.unary(GetCartSvc(inner), req).await)
                    })
                }
                "/hipstershop.CartService/EmptyCart" => {
                    struct EmptyCartSvc<T: CartService>(Arc<T>);
                    impl<T: CartService> tonic::server::UnaryService<proto::EmptyCartRequest> for EmptyCartSvc<T> {
                        type Response = proto::Empty;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<proto::EmptyCartRequest>,
                        ) -> Self::Future {
                            let inner = Arc::clone(&self.0);
                            Box::pin(async move { inner.empty_cart(request).await })
                        }
                    }
                    Box::pin(async move {
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec);
                        Ok(grpc.unary(EmptyCartSvc(inner), req).await)
                    })
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(empty_body())
                        .unwrap())
                }),
            }
        }
    }

    impl<T: CartService> tonic::server::NamedService for CartServiceServer<T> {
        const NAME: &'static str = "hipstershop.CartService";
    }
}
