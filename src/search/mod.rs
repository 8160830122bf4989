pub mod pinecone;
