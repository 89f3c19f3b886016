use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that the database is cleared regardless of how the test terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// [`mongodb::Database`], [`rocket::http::Header`] and
/// [`crate::model::mongodb::Coll<T>`]. A `Header` parameter receives the
/// `Authorization` header of a freshly signed-in account: an administrator by
/// default, or an ordinary user with `#[backend_test(user)]`.
///
/// The tests need a reachable MongoDB, so they are ignored unless the
/// `mongo-tests` feature is enabled.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let (test_args, collection_idents, collection_types) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Choose which account the injected header signs in as.
    let example_account = match parse_macro_input!(args as Option<Ident>) {
        None => quote! { example_admin },
        Some(arg) if arg == "admin" => quote! { example_admin },
        Some(arg) if arg == "user" => quote! { example },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or `user`")
                .into_compile_error()
                .into();
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        #[cfg_attr(not(feature = "mongo-tests"), ignore = "needs a MongoDB server; enable the `mongo-tests` feature")]
        fn #name() {
            /// Test setup.
            async fn setup() -> (rocket::local::asynchronous::Client, mongodb::Database, rocket::http::Header<'static>) {
                let db_client = crate::db_client().await;
                let db_name = crate::database();
                let rocket_client = rocket::local::asynchronous::Client::tracked(crate::rocket_for_db(db_client.clone(), &db_name).await)
                    .await
                    .unwrap();
                let db = db_client.database(&db_name);

                // Create the account and sign in as it.
                let account = crate::model::db::user::NewUser::#example_account();
                crate::model::mongodb::Coll::<crate::model::db::user::NewUser>::from_db(&db)
                    .insert_one(&account, None)
                    .await
                    .unwrap();
                let response = rocket_client
                    .post("/api/auth/signin/local")
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!({
                        "email": account.email,
                        "password": crate::model::db::user::examples::EXAMPLE_PASSWORD,
                    }).to_string())
                    .dispatch()
                    .await;
                let signed_in = response
                    .into_json::<crate::model::api::user::SignInResponse>()
                    .await
                    .unwrap();
                let auth = rocket::http::Header::new("Authorization", signed_in.token);

                (rocket_client, db, auth)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: mongodb::Database) {
                db.drop(None).await.unwrap();
            }

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (rocket_client, db, auth) = outer_runtime.block_on(setup());

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let client_mutex = std::sync::Mutex::new(rocket_client);
            let db_mutex = std::sync::Mutex::new(db.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                let rocket_client = client_mutex.into_inner().unwrap();
                let db = db_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                #(
                    let #collection_idents = crate::model::mongodb::Coll::<#collection_types>::from_db(&db);
                )*

                runtime.block_on(#new_name(#(#test_args,)* #(#collection_idents,)*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
///
/// Collection parameters must come after all other parameters.
#[allow(clippy::type_complexity)]
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, Vec<Ident>, Vec<Type>), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut injected = vec![];
    let mut args = vec![];
    let mut collection_idents = vec![];
    let mut collection_types = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself
                    let last = type_path.path.segments.last().unwrap();
                    let injection = if last.ident == "Client" {
                        Some(quote! { rocket_client })
                    } else if last.ident == "Database" {
                        Some(quote! { db })
                    } else if last.ident == "Header" {
                        Some(quote! { auth })
                    } else {
                        None
                    };
                    if let Some(injection) = injection {
                        if injected.contains(&last.ident) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{}`", last.ident),
                            ));
                        }
                        if !collection_idents.is_empty() {
                            return Err(syn::Error::new(
                                input.span(),
                                "Collections must be the last parameters",
                            ));
                        }
                        injected.push(last.ident.clone());
                        args.push(injection);
                        continue;
                    }

                    if last.ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &last.arguments {
                            if let Some(GenericArgument::Type(collection_type)) =
                                generics.args.first()
                            {
                                collection_idents.push(pat_ident.ident.clone());
                                collection_types.push(collection_type.clone());
                                continue;
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `db_ident: Database`, `auth_ident: Header` or `collection_ident: Coll<T>`",
        ));
    }

    Ok((args, collection_idents, collection_types))
}
